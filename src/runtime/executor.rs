//! Frame execution.
//!
//! One present runs: capture host state, copy the host's color and depth
//! into the backbuffer copies, run every enabled technique pass by pass,
//! copy the result back to the presentation surface, restore host state.

use super::compile::CompiledEffect;
use super::device::{BlitMask, FramebufferTarget, GraphicsDevice, RasterState};
use super::resources::{Pass, SurfaceResources, Technique};

/// Draw activity recorded since the last present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub vertices: u64,
}

impl FrameStats {
    pub fn record_draw(&mut self, vertices: u32) {
        self.draw_calls += 1;
        self.vertices += u64::from(vertices);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Runs the present sequence. Returns the number of passes drawn.
pub fn present_frame(
    device: &mut dyn GraphicsDevice,
    surface: &SurfaceResources,
    effect: Option<&CompiledEffect>,
) -> usize {
    let saved = device.capture_state();
    let (width, height) = (surface.width, surface.height);
    let backbuffer = FramebufferTarget::Framebuffer(surface.backbuffer_framebuffer);
    let blit = FramebufferTarget::Framebuffer(surface.blit_framebuffer);

    device.blit(FramebufferTarget::Default, backbuffer, width, height, BlitMask::COLOR);
    let depth_source = surface
        .depth_source_framebuffer
        .map_or(FramebufferTarget::Default, FramebufferTarget::Framebuffer);
    device.blit(depth_source, blit, width, height, BlitMask::DEPTH);

    let passes = match effect {
        Some(effect) => apply_effect(device, surface, effect),
        None => 0,
    };

    device.blit(backbuffer, FramebufferTarget::Default, width, height, BlitMask::COLOR);
    device.set_viewport(width, height);

    device.apply_state(&saved);
    passes
}

fn apply_effect(
    device: &mut dyn GraphicsDevice,
    surface: &SurfaceResources,
    effect: &CompiledEffect,
) -> usize {
    for (unit, sampler) in effect.samplers.iter().enumerate() {
        let view = effect
            .textures
            .get(&sampler.texture)
            .and_then(|texture| texture.view(surface, sampler.srgb));
        device.bind_texture_unit(unit as u32, view, Some(sampler.handle));
    }
    device.bind_uniform_buffer(0, effect.uniform_buffer);

    effect
        .techniques
        .iter()
        .filter(|technique| technique.enabled)
        .map(|technique| render_technique(device, surface, effect, technique))
        .sum()
}

fn render_technique(
    device: &mut dyn GraphicsDevice,
    surface: &SurfaceResources,
    effect: &CompiledEffect,
    technique: &Technique,
) -> usize {
    device.bind_framebuffer(
        FramebufferTarget::Framebuffer(surface.backbuffer_framebuffer),
        &[true],
    );
    device.clear_depth_stencil(1.0, 0);

    if let Some(buffer) = effect.uniform_buffer {
        device.update_uniform_buffer(buffer, &effect.uniform_storage);
    }

    for pass in &technique.passes {
        render_pass(device, surface, effect, pass);
    }
    technique.passes.len()
}

fn render_pass(
    device: &mut dyn GraphicsDevice,
    surface: &SurfaceResources,
    effect: &CompiledEffect,
    pass: &Pass,
) {
    device.use_program(Some(pass.program));
    device.set_pass_state(&pass.state);
    device.set_raster_state(&RasterState::default());

    // Snapshot of the previous pass's output, sampled as the backbuffer.
    device.blit(
        FramebufferTarget::Framebuffer(surface.backbuffer_framebuffer),
        FramebufferTarget::Framebuffer(surface.blit_framebuffer),
        surface.width,
        surface.height,
        BlitMask::COLOR,
    );

    device.bind_framebuffer(pass.framebuffer, &pass.draw_buffers);
    device.set_viewport(pass.viewport.0, pass.viewport.1);
    for (slot, _) in pass.draw_buffers.iter().enumerate().filter(|(_, on)| **on) {
        device.clear_color(slot as u32, [0.0; 4]);
    }

    device.draw_fullscreen_triangle();

    for &written in &pass.draw_textures {
        for sampler in &effect.samplers {
            let Some(texture) = effect.textures.get(&sampler.texture) else {
                continue;
            };
            if texture.levels > 1 && texture.owns_view(surface, written) {
                if let Some(view) = texture.view(surface, sampler.srgb) {
                    device.generate_mipmaps(view);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_stats_accumulate_and_reset() {
        let mut stats = FrameStats::default();
        stats.record_draw(3);
        stats.record_draw(36);
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.vertices, 39);
        stats.reset();
        assert_eq!(stats, FrameStats::default());
    }
}
