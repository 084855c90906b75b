//! Vertical flips between top-left origin image data and the bottom-left
//! origin the backend stores.
//!
//! Uncompressed data flips by rows. Block-compressed data flips by rows of
//! 4×4 blocks, and the index rows inside every block are reversed as well.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use image::RgbaImage;

use crate::ast::PixelFormat;

/// Bytes per pixel for uncompressed formats, bytes per 4×4 block for
/// compressed ones.
pub fn unit_size(format: PixelFormat) -> usize {
    match format {
        PixelFormat::R8 => 1,
        PixelFormat::Rg8 | PixelFormat::R16f => 2,
        PixelFormat::Rg16 | PixelFormat::Rg16f | PixelFormat::R32f | PixelFormat::Rgba8 => 4,
        PixelFormat::Rgba16 | PixelFormat::Rgba16f | PixelFormat::Rg32f => 8,
        PixelFormat::Rgba32f => 16,
        PixelFormat::Dxt1 | PixelFormat::Latc1 | PixelFormat::Rgtc1 => 8,
        PixelFormat::Dxt3 | PixelFormat::Dxt5 | PixelFormat::Latc2 => 16,
    }
}

pub fn is_block_compressed(format: PixelFormat) -> bool {
    matches!(
        format,
        PixelFormat::Dxt1
            | PixelFormat::Dxt3
            | PixelFormat::Dxt5
            | PixelFormat::Latc1
            | PixelFormat::Latc2
            | PixelFormat::Rgtc1
    )
}

/// Size in bytes of the top mip level of a `width`×`height` image.
pub fn image_size(format: PixelFormat, width: u32, height: u32) -> usize {
    let (columns, rows) = grid(format, width, height);
    columns * rows * unit_size(format)
}

/// Columns and rows of pixels, or of blocks for compressed formats.
fn grid(format: PixelFormat, width: u32, height: u32) -> (usize, usize) {
    if is_block_compressed(format) {
        (width.div_ceil(4) as usize, height.div_ceil(4) as usize)
    } else {
        (width as usize, height as usize)
    }
}

// ── Block flips ──────────────────────────────────────────────────────────

/// Color endpoints in bytes 0..4, one byte of 2-bit indices per row after.
fn flip_bc1_block(block: &mut [u8]) {
    block.swap(4, 7);
    block.swap(5, 6);
}

/// Explicit alpha, two bytes per row, followed by a BC1 color block.
fn flip_bc2_block(block: &mut [u8]) {
    block.swap(0, 6);
    block.swap(1, 7);
    block.swap(2, 4);
    block.swap(3, 5);
    flip_bc1_block(&mut block[8..16]);
}

/// Two endpoints followed by 48 bits of 3-bit indices, 12 bits per row.
fn flip_bc4_block(block: &mut [u8]) {
    let rows_01 = u32::from(block[2]) | u32::from(block[3]) << 8 | u32::from(block[4]) << 16;
    let rows_23 = u32::from(block[5]) | u32::from(block[6]) << 8 | u32::from(block[7]) << 16;
    let rows_10 = (rows_01 & 0x000FFF) << 12 | (rows_01 & 0xFFF000) >> 12;
    let rows_32 = (rows_23 & 0x000FFF) << 12 | (rows_23 & 0xFFF000) >> 12;
    block[2..5].copy_from_slice(&rows_32.to_le_bytes()[..3]);
    block[5..8].copy_from_slice(&rows_10.to_le_bytes()[..3]);
}

/// BC4 alpha block followed by a BC1 color block.
fn flip_bc3_block(block: &mut [u8]) {
    flip_bc4_block(&mut block[..8]);
    flip_bc1_block(&mut block[8..16]);
}

/// Two BC4 blocks.
fn flip_bc5_block(block: &mut [u8]) {
    flip_bc4_block(&mut block[..8]);
    flip_bc4_block(&mut block[8..16]);
}

fn block_flip(format: PixelFormat) -> Option<fn(&mut [u8])> {
    match format {
        PixelFormat::Dxt1 => Some(flip_bc1_block),
        PixelFormat::Dxt3 => Some(flip_bc2_block),
        PixelFormat::Dxt5 => Some(flip_bc3_block),
        PixelFormat::Latc1 | PixelFormat::Rgtc1 => Some(flip_bc4_block),
        PixelFormat::Latc2 => Some(flip_bc5_block),
        _ => None,
    }
}

// ── Whole images ─────────────────────────────────────────────────────────

/// Flips the top mip level of `data` in place. `data` must hold exactly
/// [`image_size`] bytes.
pub fn flip_image(format: PixelFormat, width: u32, height: u32, data: &mut [u8]) -> Result<()> {
    let expected = image_size(format, width, height);
    if data.len() != expected {
        bail!(
            "{format:?} image of {width}x{height} needs {expected} bytes, got {}",
            data.len()
        );
    }

    let (columns, rows) = grid(format, width, height);
    let unit = unit_size(format);
    let stride = columns * unit;
    if stride == 0 {
        return Ok(());
    }

    for y in 0..rows / 2 {
        let (top, bottom) = data.split_at_mut((rows - 1 - y) * stride);
        top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
    }

    if let Some(flip_block) = block_flip(format) {
        for block in data.chunks_exact_mut(unit) {
            flip_block(block);
        }
    }
    Ok(())
}

/// Turns a bottom-up RGBA8 readback into a top-down image with opaque
/// alpha.
pub fn screenshot_image(width: u32, height: u32, mut pixels: Vec<u8>) -> Result<RgbaImage> {
    pixels.resize(width as usize * height as usize * 4, 0);
    let mut image = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("screenshot buffer does not match {width}x{height}"))?;
    image::imageops::flip_vertical_in_place(&mut image);
    for pixel in image.pixels_mut() {
        pixel[3] = 0xFF;
    }
    Ok(image)
}

pub fn save_png(image: &RgbaImage, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write screenshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const COMPRESSED: [PixelFormat; 6] = [
        PixelFormat::Dxt1,
        PixelFormat::Dxt3,
        PixelFormat::Dxt5,
        PixelFormat::Latc1,
        PixelFormat::Latc2,
        PixelFormat::Rgtc1,
    ];

    #[test]
    fn test_rows_swap_for_uncompressed() {
        let mut data = vec![1, 1, 2, 2, 3, 3];
        flip_image(PixelFormat::Rg8, 1, 3, &mut data).unwrap();
        assert_eq!(data, vec![3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn test_bc1_reverses_index_rows() {
        let mut block = [0xA0, 0xA1, 0xA2, 0xA3, 1, 2, 3, 4];
        flip_image(PixelFormat::Dxt1, 4, 4, &mut block).unwrap();
        assert_eq!(block, [0xA0, 0xA1, 0xA2, 0xA3, 4, 3, 2, 1]);
    }

    #[test]
    fn test_bc4_reverses_twelve_bit_rows() {
        // Rows 0..4 hold indices 0x111, 0x222, 0x333, 0x444.
        let rows_01: u32 = 0x222 << 12 | 0x111;
        let rows_23: u32 = 0x444 << 12 | 0x333;
        let mut block = [7u8, 9, 0, 0, 0, 0, 0, 0];
        block[2..5].copy_from_slice(&rows_01.to_le_bytes()[..3]);
        block[5..8].copy_from_slice(&rows_23.to_le_bytes()[..3]);

        flip_image(PixelFormat::Rgtc1, 4, 4, &mut block).unwrap();

        let expected_01: u32 = 0x333 << 12 | 0x444;
        let expected_23: u32 = 0x111 << 12 | 0x222;
        assert_eq!(&block[..2], &[7, 9]);
        assert_eq!(&block[2..5], &expected_01.to_le_bytes()[..3]);
        assert_eq!(&block[5..8], &expected_23.to_le_bytes()[..3]);
    }

    #[test]
    fn test_block_rows_swap() {
        // 4x8 DXT1: two block rows of one block each.
        let mut data: Vec<u8> = (0..16).collect();
        flip_image(PixelFormat::Dxt1, 4, 8, &mut data).unwrap();
        assert_eq!(&data[..4], &[8, 9, 10, 11]);
        assert_eq!(&data[8..12], &[0, 1, 2, 3]);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let mut data = vec![0; 10];
        assert!(flip_image(PixelFormat::Rgba8, 2, 2, &mut data).is_err());
        assert_eq!(image_size(PixelFormat::Dxt5, 5, 5), 4 * 16);
        assert_eq!(image_size(PixelFormat::Rgba32f, 2, 3), 96);
    }

    #[test]
    fn test_screenshot_is_top_down_and_opaque() {
        let pixels = vec![
            1, 1, 1, 0, // bottom row
            2, 2, 2, 7, // top row
        ];
        let image = screenshot_image(1, 2, pixels).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [2, 2, 2, 255]);
        assert_eq!(image.get_pixel(0, 1).0, [1, 1, 1, 255]);
    }

    proptest! {
        #[test]
        fn double_flip_restores_compressed_data(
            format_index in 0usize..6,
            width in 1u32..33,
            height in 1u32..33,
            seed in any::<u64>(),
        ) {
            let format = COMPRESSED[format_index];
            let len = image_size(format, width, height);
            let original: Vec<u8> = (0..len)
                .map(|i| (seed.rotate_left((i % 64) as u32) as u8) ^ (i as u8))
                .collect();

            let mut data = original.clone();
            flip_image(format, width, height, &mut data).unwrap();
            flip_image(format, width, height, &mut data).unwrap();
            prop_assert_eq!(data, original);
        }
    }
}
