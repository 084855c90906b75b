//! The runtime a host drives: surface lifecycle, effect compilation,
//! per-frame presentation and the notifications feeding the depth-source
//! heuristic.

use anyhow::{Context, Result, bail};
use image::RgbaImage;

use crate::ast::NodeTree;
use crate::config::RuntimeConfig;

use super::compile::{CompileReport, CompiledEffect, compile_effect};
use super::depth::{DepthSourceKey, DepthSourceTracker, apply_depth_update};
use super::device::{AttachmentKey, BoundDepth, GraphicsDevice};
use super::executor::{FrameStats, present_frame};
use super::image_flip::{flip_image, screenshot_image};
use super::resources::{
    DEFAULT_DEPTH_FORMAT, SurfaceResources, Technique, Texture, TextureSource, Uniform,
};

/// Framebuffer attachment point reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentPoint {
    Color(u32),
    Depth,
    Stencil,
    DepthStencil,
}

impl AttachmentPoint {
    pub fn has_depth(self) -> bool {
        matches!(self, Self::Depth | Self::DepthStencil)
    }
}

pub struct EffectRuntime<D: GraphicsDevice> {
    device: D,
    config: RuntimeConfig,
    surface: Option<SurfaceResources>,
    effect: Option<CompiledEffect>,
    /// Tree of the current effect, recompiled after a resize.
    last_tree: Option<NodeTree>,
    depth: DepthSourceTracker,
    stats: FrameStats,
    frame_count: u64,
}

impl<D: GraphicsDevice> EffectRuntime<D> {
    pub fn new(device: D, config: RuntimeConfig) -> Self {
        let depth = DepthSourceTracker::new(config.depth.clone());
        Self {
            device,
            config,
            surface: None,
            effect: None,
            last_tree: None,
            depth,
            stats: FrameStats::default(),
            frame_count: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ── Lifecycle ──

    pub fn is_initialized(&self) -> bool {
        self.surface.is_some()
    }

    /// Creates the shared surfaces for a `width`×`height` presentation
    /// surface. On failure the runtime stays uninitialized.
    pub fn init(&mut self, width: u32, height: u32) -> Result<()> {
        if self.surface.is_some() {
            self.reset();
        }
        let surface = match SurfaceResources::create(&mut self.device, width, height) {
            Ok(surface) => surface,
            Err(e) => {
                log::error!("failed to initialize runtime at {width}x{height}: {e:#}");
                return Err(e);
            }
        };
        self.depth.set_default(width, height, DEFAULT_DEPTH_FORMAT);
        self.surface = Some(surface);
        log::info!("runtime initialized at {width}x{height}");
        Ok(())
    }

    /// Releases the effect and the shared surfaces. Known depth sources are
    /// kept; the selection goes back to the default one.
    pub fn reset(&mut self) {
        if let Some(effect) = self.effect.take() {
            effect.release(&mut self.device);
        }
        if let Some(surface) = self.surface.take() {
            surface.release(&mut self.device);
        }
        self.depth.reset_selection();
        self.stats.reset();
    }

    /// Tears everything down, initializes at the new size and recompiles the
    /// last successfully compiled effect.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.reset();
        self.init(width, height)?;
        if let Some(tree) = self.last_tree.take() {
            let result = self.compile(&tree);
            if result.is_err() {
                self.last_tree = Some(tree);
            }
            result.context("failed to recompile effect after resize")?;
        }
        Ok(())
    }

    // ── Compilation ──

    /// Compiles `tree` and makes it the current effect. On failure the
    /// previous effect stays in place and the error carries every
    /// diagnostic.
    pub fn compile(&mut self, tree: &NodeTree) -> Result<CompileReport> {
        let Some(surface) = self.surface.as_ref() else {
            bail!("cannot compile an effect before the runtime is initialized");
        };
        let (effect, report) = compile_effect(&mut self.device, surface, tree, &self.config)?;
        if let Some(previous) = self.effect.replace(effect) {
            previous.release(&mut self.device);
        }
        self.last_tree = Some(tree.clone());
        log::info!(
            "effect compiled with {} technique(s)",
            self.effect.as_ref().map_or(0, |e| e.techniques.len())
        );
        Ok(report)
    }

    pub fn effect(&self) -> Option<&CompiledEffect> {
        self.effect.as_ref()
    }

    pub fn surface(&self) -> Option<&SurfaceResources> {
        self.surface.as_ref()
    }

    // ── Frame ──

    /// Runs the current effect over the host's frame. Returns the number of
    /// passes drawn.
    pub fn present(&mut self) -> usize {
        let Some(surface) = self.surface.as_mut() else {
            log::warn!("failed to present, runtime is in a lost state");
            return 0;
        };
        if self.stats.draw_calls == 0 {
            return 0;
        }

        let update = self.depth.update(
            (surface.width, surface.height),
            self.stats.draw_calls,
            surface.depth_texture.is_some(),
        );
        apply_depth_update(surface, &mut self.device, &update);

        let passes = present_frame(&mut self.device, surface, self.effect.as_ref());
        log::trace!(
            "frame {}: {} draw call(s), {} vertices, {passes} pass(es)",
            self.frame_count,
            self.stats.draw_calls,
            self.stats.vertices
        );
        self.stats.reset();
        self.frame_count += 1;
        passes
    }

    /// Reports a host draw call of `vertices` vertices.
    pub fn on_draw_call(&mut self, vertices: u32) {
        self.stats.record_draw(vertices);

        let key = match self.device.current_depth_attachment() {
            BoundDepth::DefaultFramebuffer => DepthSourceKey::Default,
            BoundDepth::Attachment { framebuffer, key } => {
                if self
                    .surface
                    .as_ref()
                    .is_some_and(|s| s.is_internal_framebuffer(framebuffer))
                {
                    return;
                }
                DepthSourceKey::Attachment(key)
            }
            BoundDepth::None => return,
        };
        self.depth.observe_draw(key, vertices);
    }

    /// Reports that the host attached `key` to `point` of `framebuffer`.
    pub fn on_framebuffer_attachment(
        &mut self,
        framebuffer: u32,
        point: AttachmentPoint,
        key: AttachmentKey,
        level: u32,
    ) {
        if key.id == 0 || !point.has_depth() {
            return;
        }
        if self
            .surface
            .as_ref()
            .is_some_and(|s| s.is_internal_framebuffer(framebuffer))
        {
            return;
        }
        if self.depth.is_known(key) {
            return;
        }
        match self.device.describe_attachment(key, level) {
            Some(info) => {
                self.depth.register(key, info);
            }
            None => log::debug!("framebuffer {framebuffer}: cannot describe attachment {key:?}"),
        }
    }

    /// Feeds the activity signal of the depth-source heuristic.
    pub fn note_activity(&mut self, bytes: usize) {
        self.depth.note_activity(bytes);
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn depth_sources(&self) -> &DepthSourceTracker {
        &self.depth
    }

    /// Top-down RGBA8 copy of the presentation surface.
    pub fn screenshot(&mut self) -> Result<RgbaImage> {
        let Some(surface) = self.surface.as_ref() else {
            bail!("cannot take a screenshot before the runtime is initialized");
        };
        let (width, height) = (surface.width, surface.height);
        let pixels = self.device.read_backbuffer(width, height);
        screenshot_image(width, height, pixels)
    }

    // ── Resources ──

    /// Replaces the image of a memory texture. `data` is top-down and in the
    /// texture's own format.
    pub fn update_texture(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let Some(texture) = self.texture(name) else {
            bail!("no texture named '{name}'");
        };
        if texture.source != TextureSource::Memory {
            bail!("texture '{name}' is not backed by memory and cannot be updated");
        }
        let Some((primary, _)) = texture.storage else {
            bail!("texture '{name}' has no storage");
        };
        let (format, width, height, levels) =
            (texture.format, texture.width, texture.height, texture.levels);

        let mut flipped = data.to_vec();
        flip_image(format, width, height, &mut flipped)
            .with_context(|| format!("cannot update texture '{name}'"))?;
        self.device.upload_texture(primary, &flipped)?;
        if levels > 1 {
            self.device.generate_mipmaps(primary);
        }
        Ok(())
    }

    pub fn texture(&self, name: &str) -> Option<&Texture> {
        self.effect.as_ref()?.textures.get(name)
    }

    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.effect.as_ref()?.uniforms.get(name)
    }

    pub fn technique(&self, name: &str) -> Option<&Technique> {
        self.effect.as_ref()?.techniques.get(name)
    }

    /// Enables or disables a technique. Returns false if there is none by
    /// that name.
    pub fn set_technique_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(technique) = self
            .effect
            .as_mut()
            .and_then(|e| e.techniques.get_mut(name))
        else {
            return false;
        };
        if technique.enabled != enabled {
            log::debug!(
                "technique '{name}' {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        technique.enabled = enabled;
        true
    }

    /// The uniform backing store, uploaded at the start of every technique.
    pub fn uniform_storage(&self) -> &[u8] {
        self.effect
            .as_ref()
            .map_or(&[][..], |e| e.uniform_storage.as_slice())
    }

    pub fn uniform_storage_mut(&mut self) -> &mut [u8] {
        match self.effect.as_mut() {
            Some(effect) => effect.uniform_storage.as_mut_slice(),
            None => &mut [],
        }
    }

    pub fn uniform_value(&self, name: &str) -> Option<&[u8]> {
        let uniform = self.uniform(name)?;
        self.uniform_storage()
            .get(uniform.offset..uniform.offset + uniform.size)
    }

    /// Writes `bytes` to the uniform named `name`. Anything beyond the
    /// uniform's size is rejected.
    pub fn set_uniform_value(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let Some(uniform) = self.uniform(name) else {
            bail!("no uniform named '{name}'");
        };
        let (offset, size) = (uniform.offset, uniform.size);
        if bytes.len() > size {
            bail!(
                "uniform '{name}' holds {size} bytes, cannot write {}",
                bytes.len()
            );
        }
        let storage = self.uniform_storage_mut();
        storage[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl<D: GraphicsDevice> Drop for EffectRuntime<D> {
    fn drop(&mut self) {
        self.reset();
    }
}
