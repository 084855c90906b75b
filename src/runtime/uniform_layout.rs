//! Byte layout of the shared uniform block.

use crate::ast::{BaseClass, Type};

/// Running cursor over the uniform block.
///
/// A value that does not fit in what is left of the current 16-byte row is
/// moved to the start of the next row. Values larger than a row are only
/// moved when the cursor is not already row-aligned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UniformLayout {
    cursor: usize,
}

impl UniformLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `size` bytes and returns their offset.
    pub fn place(&mut self, size: usize) -> usize {
        let remaining = 16 - self.cursor % 16;
        let offset = if size > remaining && (remaining != 16 || size <= 16) {
            self.cursor + remaining
        } else {
            self.cursor
        };
        self.cursor = offset + size;
        offset
    }

    /// End of the last placed value.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Size of the backing store: the cursor rounded up to whole rows.
    pub fn size(&self) -> usize {
        self.cursor.div_ceil(16) * 16
    }
}

/// Storage size of a uniform of type `ty`: four bytes per component, times
/// the array length.
pub fn storage_size(ty: &Type) -> usize {
    let element = match ty.base {
        BaseClass::Bool | BaseClass::Int | BaseClass::Uint | BaseClass::Float => 4,
        _ => 0,
    };
    let count = ty.array_length.map_or(1, |n| n.max(1)) as usize;
    ty.rows as usize * ty.cols as usize * count * element
}
