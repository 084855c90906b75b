//! Graphics device capability.
//!
//! The runtime never talks to a graphics API directly. Everything it needs
//! (object creation, state, draws, readback) goes through [`GraphicsDevice`],
//! which a host implements over its context. [`super::headless::HeadlessDevice`]
//! is the in-memory implementation used by the CLI and the tests.

use anyhow::Result;

use crate::ast::PixelFormat;
use crate::compiler::ShaderStage;

// ── Handles ──────────────────────────────────────────────────────────────

macro_rules! handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

handle!(
    TextureHandle,
    RenderbufferHandle,
    FramebufferHandle,
    SamplerHandle,
    BufferHandle,
    ProgramHandle,
);

// ── Formats ──────────────────────────────────────────────────────────────

/// Storage formats the runtime allocates. `Other` carries a host-specific
/// format code for depth attachments discovered at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceFormat {
    R8,
    R16F,
    R32F,
    Rg8,
    Rg16,
    Rg16F,
    Rg32F,
    Rgba8,
    Srgb8Alpha8,
    Rgba16,
    Rgba16F,
    Rgba32F,
    Bc1,
    Bc1Srgb,
    Bc2,
    Bc2Srgb,
    Bc3,
    Bc3Srgb,
    Bc4,
    Bc5,
    Depth24Stencil8,
    Depth32FStencil8,
    Depth16,
    Depth24,
    Depth32F,
    Other(u32),
}

impl DeviceFormat {
    /// Primary storage format and the optional sRGB view format of an
    /// effect texture.
    pub fn for_pixel_format(format: PixelFormat) -> (DeviceFormat, Option<DeviceFormat>) {
        match format {
            PixelFormat::R8 => (DeviceFormat::R8, None),
            PixelFormat::R16f => (DeviceFormat::R16F, None),
            PixelFormat::R32f => (DeviceFormat::R32F, None),
            PixelFormat::Rg8 => (DeviceFormat::Rg8, None),
            PixelFormat::Rg16 => (DeviceFormat::Rg16, None),
            PixelFormat::Rg16f => (DeviceFormat::Rg16F, None),
            PixelFormat::Rg32f => (DeviceFormat::Rg32F, None),
            PixelFormat::Rgba8 => (DeviceFormat::Rgba8, Some(DeviceFormat::Srgb8Alpha8)),
            PixelFormat::Rgba16 => (DeviceFormat::Rgba16, None),
            PixelFormat::Rgba16f => (DeviceFormat::Rgba16F, None),
            PixelFormat::Rgba32f => (DeviceFormat::Rgba32F, None),
            PixelFormat::Dxt1 => (DeviceFormat::Bc1, Some(DeviceFormat::Bc1Srgb)),
            PixelFormat::Dxt3 => (DeviceFormat::Bc2, Some(DeviceFormat::Bc2Srgb)),
            PixelFormat::Dxt5 => (DeviceFormat::Bc3, Some(DeviceFormat::Bc3Srgb)),
            PixelFormat::Latc1 | PixelFormat::Rgtc1 => (DeviceFormat::Bc4, None),
            PixelFormat::Latc2 => (DeviceFormat::Bc5, None),
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            DeviceFormat::Bc1
                | DeviceFormat::Bc1Srgb
                | DeviceFormat::Bc2
                | DeviceFormat::Bc2Srgb
                | DeviceFormat::Bc3
                | DeviceFormat::Bc3Srgb
                | DeviceFormat::Bc4
                | DeviceFormat::Bc5
        )
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            DeviceFormat::Depth24Stencil8
                | DeviceFormat::Depth32FStencil8
                | DeviceFormat::Depth16
                | DeviceFormat::Depth24
                | DeviceFormat::Depth32F
        )
    }
}

// ── Attachments ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentKind {
    Texture,
    Renderbuffer,
}

/// Identity of a depth attachment owned by the host. Texture and
/// renderbuffer ids live in separate spaces, so the kind is part of the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentKey {
    pub kind: AttachmentKind,
    pub id: u32,
}

impl AttachmentKey {
    pub fn texture(id: u32) -> Self {
        Self {
            kind: AttachmentKind::Texture,
            id,
        }
    }

    pub fn renderbuffer(id: u32) -> Self {
        Self {
            kind: AttachmentKind::Renderbuffer,
            id,
        }
    }
}

/// Size and format of an attachment as reported by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub width: u32,
    pub height: u32,
    pub level: u32,
    pub format: DeviceFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorAttachment {
    Texture(TextureHandle),
    Renderbuffer(RenderbufferHandle),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthAttachment {
    Texture(TextureHandle, u32),
    Renderbuffer(RenderbufferHandle),
    /// An attachment that belongs to the host, addressed by its identity.
    Host(AttachmentKey, u32),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub color: Vec<Option<ColorAttachment>>,
    pub depth_stencil: Option<DepthAttachment>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramebufferTarget {
    /// The host's presentation surface.
    Default,
    Framebuffer(FramebufferHandle),
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BlitMask: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

/// What the active draw framebuffer has bound as depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundDepth {
    DefaultFramebuffer,
    Attachment {
        framebuffer: u32,
        key: AttachmentKey,
    },
    None,
}

// ── Sampler state ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    #[default]
    ClampToEdge,
    ClampToBorder,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MinFilter {
    NearestMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapNearest,
    #[default]
    LinearMipmapLinear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MagFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub address: [AddressMode; 3],
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
    pub lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub max_anisotropy: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            address: [AddressMode::ClampToEdge; 3],
            min_filter: MinFilter::default(),
            mag_filter: MagFilter::default(),
            lod_bias: 0.0,
            min_lod: -1000.0,
            max_lod: 1000.0,
            max_anisotropy: 1.0,
        }
    }
}

// ── Fixed-function state ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFunc {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StencilAction {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

/// Blend, depth, stencil and write-mask state of one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassState {
    pub framebuffer_srgb: bool,
    pub color_write_mask: [bool; 4],
    pub blend_enable: bool,
    pub blend_src: BlendFunc,
    pub blend_dest: BlendFunc,
    pub blend_op_color: BlendEquation,
    pub blend_op_alpha: BlendEquation,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareOp,
    pub stencil_test: bool,
    pub stencil_func: CompareOp,
    pub stencil_ref: u32,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub stencil_fail: StencilAction,
    pub stencil_depth_fail: StencilAction,
    pub stencil_pass: StencilAction,
}

/// Rasterizer state every pass draws with: no scissor, CCW front faces,
/// filled polygons, no culling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RasterState {
    pub scissor_test: bool,
    pub front_face_cw: bool,
    pub wireframe: bool,
    pub cull: bool,
}

/// Opaque snapshot of everything the host has bound, taken before an
/// effect runs and applied afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateBlock {
    pub framebuffer: Option<FramebufferTarget>,
    pub program: Option<ProgramHandle>,
    pub viewport: [u32; 4],
    pub pass_state: Option<PassState>,
    pub raster_state: Option<RasterState>,
    pub texture_units: Vec<(u32, Option<TextureHandle>, Option<SamplerHandle>)>,
    pub uniform_buffer: Option<BufferHandle>,
}

// ── The capability ───────────────────────────────────────────────────────

pub trait GraphicsDevice {
    // Surface
    fn client_size(&self) -> (u32, u32);

    // Textures
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        levels: u32,
        format: DeviceFormat,
    ) -> Result<TextureHandle>;
    /// A second view onto `source` storage, reinterpreted as `format`.
    fn create_texture_view(
        &mut self,
        source: TextureHandle,
        format: DeviceFormat,
    ) -> Result<TextureHandle>;
    fn delete_texture(&mut self, texture: TextureHandle);
    /// Uploads level 0. `data` is in the backend's bottom-to-top row order.
    fn upload_texture(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()>;
    fn generate_mipmaps(&mut self, texture: TextureHandle);
    fn clear_texture(&mut self, texture: TextureHandle, color: [f32; 4]);

    // Renderbuffers
    fn create_renderbuffer(
        &mut self,
        width: u32,
        height: u32,
        format: DeviceFormat,
    ) -> Result<RenderbufferHandle>;
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    // Framebuffers
    /// Fails when the resulting framebuffer is incomplete.
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);
    fn bind_framebuffer(&mut self, target: FramebufferTarget, draw_buffers: &[bool]);
    fn clear_color(&mut self, slot: u32, color: [f32; 4]);
    fn clear_depth_stencil(&mut self, depth: f32, stencil: u8);
    fn blit(
        &mut self,
        source: FramebufferTarget,
        destination: FramebufferTarget,
        width: u32,
        height: u32,
        mask: BlitMask,
    );
    fn set_viewport(&mut self, width: u32, height: u32);

    // Samplers
    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle>;
    fn delete_sampler(&mut self, sampler: SamplerHandle);
    fn bind_texture_unit(
        &mut self,
        unit: u32,
        texture: Option<TextureHandle>,
        sampler: Option<SamplerHandle>,
    );

    // Uniform buffers
    fn create_uniform_buffer(&mut self, size: usize) -> Result<BufferHandle>;
    fn update_uniform_buffer(&mut self, buffer: BufferHandle, data: &[u8]);
    fn bind_uniform_buffer(&mut self, binding: u32, buffer: Option<BufferHandle>);
    fn delete_buffer(&mut self, buffer: BufferHandle);

    // Programs
    /// Compiles and links the given stages. The error carries the backend's
    /// info log.
    fn create_program(&mut self, stages: &[(ShaderStage, &str)]) -> Result<ProgramHandle>;
    fn delete_program(&mut self, program: ProgramHandle);
    fn use_program(&mut self, program: Option<ProgramHandle>);

    // Pipeline state
    fn set_pass_state(&mut self, state: &PassState);
    fn set_raster_state(&mut self, state: &RasterState);

    /// Three vertices, no vertex buffers: positions come from the vertex id.
    fn draw_fullscreen_triangle(&mut self);

    // State save/restore
    fn capture_state(&mut self) -> StateBlock;
    fn apply_state(&mut self, state: &StateBlock);

    // Depth queries
    fn current_depth_attachment(&self) -> BoundDepth;
    fn describe_attachment(&self, key: AttachmentKey, level: u32) -> Option<AttachmentInfo>;

    /// Top-to-bottom is not guaranteed: rows come in the backend's order.
    fn read_backbuffer(&mut self, width: u32, height: u32) -> Vec<u8>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srgb_views_only_for_color_formats() {
        assert_eq!(
            DeviceFormat::for_pixel_format(PixelFormat::Rgba8),
            (DeviceFormat::Rgba8, Some(DeviceFormat::Srgb8Alpha8))
        );
        assert_eq!(
            DeviceFormat::for_pixel_format(PixelFormat::Dxt5).1,
            Some(DeviceFormat::Bc3Srgb)
        );
        assert_eq!(DeviceFormat::for_pixel_format(PixelFormat::R32f).1, None);
        assert_eq!(
            DeviceFormat::for_pixel_format(PixelFormat::Rgtc1).0,
            DeviceFormat::Bc4
        );
    }

    #[test]
    fn test_attachment_keys_do_not_collide() {
        assert_ne!(AttachmentKey::texture(3), AttachmentKey::renderbuffer(3));
        assert!(DeviceFormat::Bc5.is_compressed());
        assert!(DeviceFormat::Depth24Stencil8.is_depth());
        assert!(!DeviceFormat::Rgba8.is_depth());
    }
}
