//! Runtime-owned objects: effect textures, samplers, uniforms, techniques,
//! and the shared surfaces every effect renders through.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};

use crate::ast::{Annotation, LiteralValue, PixelFormat, Type};

use super::device::{
    AttachmentInfo, ColorAttachment, DepthAttachment, DeviceFormat, FramebufferDesc,
    FramebufferHandle, FramebufferTarget, GraphicsDevice, PassState, ProgramHandle,
    RenderbufferHandle, SamplerHandle, TextureHandle,
};

pub type Annotations = BTreeMap<String, LiteralValue>;

pub fn annotation_map(annotations: &[Annotation]) -> Annotations {
    annotations
        .iter()
        .map(|a| (a.name.clone(), a.value.clone()))
        .collect()
}

// ── Resource table ───────────────────────────────────────────────────────

pub trait Named {
    fn name(&self) -> &str;
}

/// Append-only collection with lookup by name. The first entry registered
/// under a name wins lookups.
#[derive(Clone, Debug)]
pub struct ResourceTable<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for ResourceTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Named> ResourceTable<T> {
    pub fn add(&mut self, value: T) -> usize {
        let id = self.entries.len();
        self.index.entry(value.name().to_string()).or_insert(id);
        self.entries.push(value);
        id
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.index.get(name).map(|&i| &mut self.entries[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn by_index(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

// ── Effect resources ─────────────────────────────────────────────────────

/// Where a texture's image comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureSource {
    /// Storage owned by the effect.
    Memory,
    /// The copy of the host's frame.
    BackBuffer,
    /// The shared depth texture fed by the depth-source heuristic.
    DepthStencil,
}

#[derive(Clone, Debug)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: PixelFormat,
    pub source: TextureSource,
    /// Primary storage and its sRGB view. Only set for `Memory` textures;
    /// shared sources are resolved through [`SurfaceResources`].
    pub storage: Option<(TextureHandle, Option<TextureHandle>)>,
    pub annotations: Annotations,
}

impl Named for Texture {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Texture {
    /// Image handle to sample or render through.
    pub fn view(&self, surface: &SurfaceResources, srgb: bool) -> Option<TextureHandle> {
        match self.source {
            TextureSource::Memory => self
                .storage
                .map(|(primary, alternate)| if srgb { alternate.unwrap_or(primary) } else { primary }),
            TextureSource::BackBuffer => Some(if srgb {
                surface.backbuffer_texture_srgb
            } else {
                surface.backbuffer_texture
            }),
            TextureSource::DepthStencil => surface.depth_texture,
        }
    }

    /// Whether either view of this texture is `handle`.
    pub fn owns_view(&self, surface: &SurfaceResources, handle: TextureHandle) -> bool {
        self.view(surface, false) == Some(handle) || self.view(surface, true) == Some(handle)
    }
}

#[derive(Clone, Debug)]
pub struct Sampler {
    pub handle: SamplerHandle,
    /// Name of the sampled texture in the effect's texture table.
    pub texture: String,
    pub srgb: bool,
}

#[derive(Clone, Debug)]
pub struct Uniform {
    pub name: String,
    pub ty: Type,
    pub offset: usize,
    pub size: usize,
    pub annotations: Annotations,
}

impl Named for Uniform {
    fn name(&self) -> &str {
        &self.name
    }
}

/// An assembled pass. Immutable once built.
#[derive(Clone, Debug)]
pub struct Pass {
    pub name: String,
    pub program: ProgramHandle,
    pub framebuffer: FramebufferTarget,
    /// Framebuffers created for explicit render targets are released with
    /// the effect; the shared backbuffer framebuffer is not.
    pub owns_framebuffer: bool,
    pub draw_buffers: [bool; crate::config::MAX_RENDER_TARGETS],
    /// Images written by the pass, for mipmap regeneration.
    pub draw_textures: Vec<TextureHandle>,
    pub viewport: (u32, u32),
    pub state: PassState,
}

#[derive(Clone, Debug)]
pub struct Technique {
    pub name: String,
    pub annotations: Annotations,
    pub enabled: bool,
    pub passes: Vec<Pass>,
}

impl Named for Technique {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A generated stage source, kept for inspection and the CLI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageSource {
    pub technique: String,
    pub pass: String,
    pub stage: crate::compiler::ShaderStage,
    pub source: String,
}

// ── Shared surfaces ──────────────────────────────────────────────────────

/// Backbuffer copies, the shared depth texture and the internal
/// framebuffers that move data between them.
#[derive(Clone, Debug)]
pub struct SurfaceResources {
    pub width: u32,
    pub height: u32,
    pub backbuffer_color: RenderbufferHandle,
    pub backbuffer_depth: RenderbufferHandle,
    pub backbuffer_framebuffer: FramebufferHandle,
    pub backbuffer_texture: TextureHandle,
    pub backbuffer_texture_srgb: TextureHandle,
    pub depth_texture: Option<TextureHandle>,
    /// Draw target of the per-frame copies: backbuffer texture (sRGB view)
    /// as color, depth texture as depth.
    pub blit_framebuffer: FramebufferHandle,
    /// Read source of the depth copy when the selected depth source is not
    /// the host's default framebuffer.
    pub depth_source_framebuffer: Option<FramebufferHandle>,
}

/// Objects created so far, deleted in reverse if initialization fails.
#[derive(Default)]
struct Rollback {
    textures: Vec<TextureHandle>,
    renderbuffers: Vec<RenderbufferHandle>,
    framebuffers: Vec<FramebufferHandle>,
}

impl Rollback {
    fn undo(self, device: &mut dyn GraphicsDevice) {
        for fb in self.framebuffers.into_iter().rev() {
            device.delete_framebuffer(fb);
        }
        for tex in self.textures.into_iter().rev() {
            device.delete_texture(tex);
        }
        for rb in self.renderbuffers.into_iter().rev() {
            device.delete_renderbuffer(rb);
        }
    }
}

pub const DEFAULT_DEPTH_FORMAT: DeviceFormat = DeviceFormat::Depth24Stencil8;

impl SurfaceResources {
    /// Creates every shared surface for a `width`×`height` presentation
    /// surface. On failure nothing stays allocated.
    pub fn create(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<Self> {
        let mut created = Rollback::default();
        match Self::create_inner(device, width, height, &mut created) {
            Ok(surface) => Ok(surface),
            Err(e) => {
                created.undo(device);
                Err(e)
            }
        }
    }

    fn create_inner(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        created: &mut Rollback,
    ) -> Result<Self> {
        let backbuffer_color = device
            .create_renderbuffer(width, height, DeviceFormat::Rgba8)
            .context("failed to create backbuffer color renderbuffer")?;
        created.renderbuffers.push(backbuffer_color);
        let backbuffer_depth = device
            .create_renderbuffer(width, height, DEFAULT_DEPTH_FORMAT)
            .context("failed to create backbuffer depth renderbuffer")?;
        created.renderbuffers.push(backbuffer_depth);

        let backbuffer_framebuffer = device
            .create_framebuffer(&FramebufferDesc {
                color: vec![Some(ColorAttachment::Renderbuffer(backbuffer_color))],
                depth_stencil: Some(DepthAttachment::Renderbuffer(backbuffer_depth)),
            })
            .context("failed to create backbuffer framebuffer")?;
        created.framebuffers.push(backbuffer_framebuffer);

        let backbuffer_texture = device
            .create_texture(width, height, 1, DeviceFormat::Rgba8)
            .context("failed to create backbuffer texture")?;
        created.textures.push(backbuffer_texture);
        let backbuffer_texture_srgb = device
            .create_texture_view(backbuffer_texture, DeviceFormat::Srgb8Alpha8)
            .context("failed to create backbuffer texture")?;
        created.textures.push(backbuffer_texture_srgb);

        let depth_texture = device
            .create_texture(width, height, 1, DEFAULT_DEPTH_FORMAT)
            .context("failed to create depth texture")?;
        created.textures.push(depth_texture);

        let blit_framebuffer = device
            .create_framebuffer(&FramebufferDesc {
                color: vec![Some(ColorAttachment::Texture(backbuffer_texture_srgb))],
                depth_stencil: Some(DepthAttachment::Texture(depth_texture, 0)),
            })
            .context("failed to create blit framebuffer")?;
        created.framebuffers.push(blit_framebuffer);

        Ok(Self {
            width,
            height,
            backbuffer_color,
            backbuffer_depth,
            backbuffer_framebuffer,
            backbuffer_texture,
            backbuffer_texture_srgb,
            depth_texture: Some(depth_texture),
            blit_framebuffer,
            depth_source_framebuffer: None,
        })
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        if let Some(fb) = self.depth_source_framebuffer {
            device.delete_framebuffer(fb);
        }
        device.delete_framebuffer(self.blit_framebuffer);
        device.delete_framebuffer(self.backbuffer_framebuffer);
        if let Some(tex) = self.depth_texture {
            device.delete_texture(tex);
        }
        device.delete_texture(self.backbuffer_texture_srgb);
        device.delete_texture(self.backbuffer_texture);
        device.delete_renderbuffer(self.backbuffer_depth);
        device.delete_renderbuffer(self.backbuffer_color);
    }

    pub fn is_internal_framebuffer(&self, id: u32) -> bool {
        id == self.backbuffer_framebuffer.0
            || id == self.blit_framebuffer.0
            || self.depth_source_framebuffer.map(|fb| fb.0) == Some(id)
    }

    /// Replaces the shared depth texture with one matching `info`, or drops
    /// it when `info` is `None`. Rebuilds the blit framebuffer around it.
    pub fn recreate_depth_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        info: Option<&AttachmentInfo>,
    ) {
        if let Some(tex) = self.depth_texture.take() {
            device.delete_texture(tex);
        }
        if let Some(info) = info {
            match device.create_texture(info.width, info.height, 1, info.format) {
                Ok(tex) => self.depth_texture = Some(tex),
                Err(e) => log::error!(
                    "failed to create depth texture for format {:?}: {e:#}",
                    info.format
                ),
            }
        }
        self.rebuild_blit_framebuffer(device);
    }

    fn rebuild_blit_framebuffer(&mut self, device: &mut dyn GraphicsDevice) {
        let desc = FramebufferDesc {
            color: vec![Some(ColorAttachment::Texture(self.backbuffer_texture_srgb))],
            depth_stencil: self.depth_texture.map(|tex| DepthAttachment::Texture(tex, 0)),
        };
        match device.create_framebuffer(&desc) {
            Ok(fb) => {
                device.delete_framebuffer(self.blit_framebuffer);
                self.blit_framebuffer = fb;
            }
            Err(e) => log::error!("failed to rebuild blit framebuffer: {e:#}"),
        }
    }
}
