//! In-memory [`GraphicsDevice`].
//!
//! Keeps object tables and a command log instead of talking to a GPU. Used by
//! the CLI to compile effects without a context, and by the tests to observe
//! exactly what the runtime asked the backend to do. Host behaviour (depth
//! attachments it owns, the frame it rendered) is simulated through the
//! `add_host_*` / `set_*` methods.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Result, anyhow, bail};

use crate::compiler::{ShaderStage, validate_glsl};

use super::device::{
    AttachmentInfo, AttachmentKey, AttachmentKind, BlitMask, BoundDepth, BufferHandle,
    ColorAttachment, DepthAttachment, DeviceFormat, FramebufferDesc, FramebufferHandle,
    FramebufferTarget, GraphicsDevice, PassState, ProgramHandle, RasterState,
    RenderbufferHandle, SamplerDesc, SamplerHandle, StateBlock, TextureHandle,
};

/// Every call the runtime made, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCommand {
    CreateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
        levels: u32,
        format: DeviceFormat,
    },
    CreateTextureView {
        texture: TextureHandle,
        source: TextureHandle,
        format: DeviceFormat,
    },
    DeleteTexture(TextureHandle),
    UploadTexture {
        texture: TextureHandle,
        bytes: usize,
    },
    GenerateMipmaps(TextureHandle),
    ClearTexture(TextureHandle, [f32; 4]),
    CreateRenderbuffer(RenderbufferHandle),
    DeleteRenderbuffer(RenderbufferHandle),
    CreateFramebuffer(FramebufferHandle),
    DeleteFramebuffer(FramebufferHandle),
    BindFramebuffer(FramebufferTarget, Vec<bool>),
    ClearColor(u32, [f32; 4]),
    ClearDepthStencil,
    Blit {
        source: FramebufferTarget,
        destination: FramebufferTarget,
        mask: BlitMask,
    },
    SetViewport(u32, u32),
    CreateSampler(SamplerHandle),
    DeleteSampler(SamplerHandle),
    BindTextureUnit(u32, Option<TextureHandle>, Option<SamplerHandle>),
    CreateUniformBuffer(BufferHandle, usize),
    UpdateUniformBuffer(BufferHandle, usize),
    BindUniformBuffer(u32, Option<BufferHandle>),
    DeleteBuffer(BufferHandle),
    CreateProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    UseProgram(Option<ProgramHandle>),
    SetPassState(PassState),
    SetRasterState(RasterState),
    Draw,
    CaptureState,
    ApplyState,
}

/// Operations whose next call can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailOp {
    Texture,
    Renderbuffer,
    Framebuffer,
    Sampler,
    Buffer,
    Program,
}

#[derive(Clone, Debug)]
pub struct HeadlessTexture {
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: DeviceFormat,
    /// Set for views: the texture whose storage they share.
    pub view_of: Option<TextureHandle>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct HeadlessProgram {
    pub stages: Vec<(ShaderStage, String)>,
}

pub struct HeadlessDevice {
    next_id: u32,
    client_size: (u32, u32),
    validate: bool,
    pending_failures: HashSet<FailOp>,

    textures: HashMap<TextureHandle, HeadlessTexture>,
    renderbuffers: HashMap<RenderbufferHandle, (u32, u32, DeviceFormat)>,
    framebuffers: HashMap<FramebufferHandle, FramebufferDesc>,
    samplers: HashMap<SamplerHandle, SamplerDesc>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    programs: HashMap<ProgramHandle, HeadlessProgram>,
    host_attachments: HashMap<AttachmentKey, AttachmentInfo>,

    framebuffer: FramebufferTarget,
    program: Option<ProgramHandle>,
    viewport: (u32, u32),
    pass_state: Option<PassState>,
    raster_state: Option<RasterState>,
    texture_units: BTreeMap<u32, (Option<TextureHandle>, Option<SamplerHandle>)>,
    uniform_buffer: Option<BufferHandle>,

    backbuffer: Vec<u8>,
    commands: Vec<DeviceCommand>,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            next_id: 1,
            client_size: (width, height),
            validate: false,
            pending_failures: HashSet::new(),
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            samplers: HashMap::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            host_attachments: HashMap::new(),
            framebuffer: FramebufferTarget::Default,
            program: None,
            viewport: (width, height),
            pass_state: None,
            raster_state: None,
            texture_units: BTreeMap::new(),
            uniform_buffer: None,
            backbuffer: vec![0; width as usize * height as usize * 4],
            commands: Vec::new(),
        }
    }

    /// Run every program stage through naga before accepting it.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn set_client_size(&mut self, width: u32, height: u32) {
        self.client_size = (width, height);
        self.backbuffer = vec![0; width as usize * height as usize * 4];
    }

    /// Makes the next call of `op` fail.
    pub fn fail_next(&mut self, op: FailOp) {
        self.pending_failures.insert(op);
    }

    /// Registers a depth attachment owned by the host.
    pub fn add_host_attachment(&mut self, key: AttachmentKey, info: AttachmentInfo) {
        self.host_attachments.insert(key, info);
    }

    /// Host-rendered pixels, bottom row first.
    pub fn set_backbuffer_pixels(&mut self, pixels: Vec<u8>) {
        self.backbuffer = pixels;
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&HeadlessTexture> {
        self.textures.get(&handle)
    }

    pub fn program(&self, handle: ProgramHandle) -> Option<&HeadlessProgram> {
        self.programs.get(&handle)
    }

    pub fn framebuffer(&self, handle: FramebufferHandle) -> Option<&FramebufferDesc> {
        self.framebuffers.get(&handle)
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&handle).map(Vec::as_slice)
    }

    pub fn bound_framebuffer(&self) -> FramebufferTarget {
        self.framebuffer
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Objects currently allocated, across all tables.
    pub fn live_objects(&self) -> usize {
        self.textures.len()
            + self.renderbuffers.len()
            + self.framebuffers.len()
            + self.samplers.len()
            + self.buffers.len()
            + self.programs.len()
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check(&mut self, op: FailOp) -> Result<()> {
        if self.pending_failures.remove(&op) {
            bail!("{op:?} creation failed");
        }
        Ok(())
    }

    fn framebuffer_complete(&self, desc: &FramebufferDesc) -> Result<()> {
        let mut any = false;
        for attachment in desc.color.iter().flatten() {
            any = true;
            let known = match attachment {
                ColorAttachment::Texture(t) => self.textures.contains_key(t),
                ColorAttachment::Renderbuffer(r) => self.renderbuffers.contains_key(r),
            };
            if !known {
                bail!("framebuffer incomplete: missing color attachment {attachment:?}");
            }
        }
        if let Some(depth) = desc.depth_stencil {
            any = true;
            let known = match depth {
                DepthAttachment::Texture(t, _) => self.textures.contains_key(&t),
                DepthAttachment::Renderbuffer(r) => self.renderbuffers.contains_key(&r),
                DepthAttachment::Host(key, level) => self.describe_attachment(key, level).is_some(),
            };
            if !known {
                bail!("framebuffer incomplete: missing depth attachment {depth:?}");
            }
        }
        if !any {
            bail!("framebuffer incomplete: no attachments");
        }
        Ok(())
    }
}

fn depth_key(attachment: DepthAttachment) -> AttachmentKey {
    match attachment {
        DepthAttachment::Texture(t, _) => AttachmentKey::texture(t.0),
        DepthAttachment::Renderbuffer(r) => AttachmentKey::renderbuffer(r.0),
        DepthAttachment::Host(key, _) => key,
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn client_size(&self) -> (u32, u32) {
        self.client_size
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        levels: u32,
        format: DeviceFormat,
    ) -> Result<TextureHandle> {
        self.check(FailOp::Texture)?;
        if width == 0 || height == 0 || levels == 0 {
            bail!("invalid texture dimensions {width}x{height} with {levels} levels");
        }
        let texture = TextureHandle(self.allocate_id());
        self.textures.insert(
            texture,
            HeadlessTexture {
                width,
                height,
                levels,
                format,
                view_of: None,
                data: Vec::new(),
            },
        );
        self.commands.push(DeviceCommand::CreateTexture {
            texture,
            width,
            height,
            levels,
            format,
        });
        Ok(texture)
    }

    fn create_texture_view(
        &mut self,
        source: TextureHandle,
        format: DeviceFormat,
    ) -> Result<TextureHandle> {
        self.check(FailOp::Texture)?;
        let base = self
            .textures
            .get(&source)
            .cloned()
            .ok_or_else(|| anyhow!("texture view of unknown texture {source:?}"))?;
        let texture = TextureHandle(self.allocate_id());
        self.textures.insert(
            texture,
            HeadlessTexture {
                format,
                view_of: Some(source),
                data: Vec::new(),
                ..base
            },
        );
        self.commands.push(DeviceCommand::CreateTextureView {
            texture,
            source,
            format,
        });
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.commands.push(DeviceCommand::DeleteTexture(texture));
    }

    fn upload_texture(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()> {
        let entry = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| anyhow!("upload to unknown texture {texture:?}"))?;
        entry.data = data.to_vec();
        self.commands.push(DeviceCommand::UploadTexture {
            texture,
            bytes: data.len(),
        });
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) {
        self.commands.push(DeviceCommand::GenerateMipmaps(texture));
    }

    fn clear_texture(&mut self, texture: TextureHandle, color: [f32; 4]) {
        self.commands.push(DeviceCommand::ClearTexture(texture, color));
    }

    fn create_renderbuffer(
        &mut self,
        width: u32,
        height: u32,
        format: DeviceFormat,
    ) -> Result<RenderbufferHandle> {
        self.check(FailOp::Renderbuffer)?;
        let renderbuffer = RenderbufferHandle(self.allocate_id());
        self.renderbuffers.insert(renderbuffer, (width, height, format));
        self.commands.push(DeviceCommand::CreateRenderbuffer(renderbuffer));
        Ok(renderbuffer)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.renderbuffers.remove(&renderbuffer);
        self.commands.push(DeviceCommand::DeleteRenderbuffer(renderbuffer));
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        self.check(FailOp::Framebuffer)?;
        self.framebuffer_complete(desc)?;
        let framebuffer = FramebufferHandle(self.allocate_id());
        self.framebuffers.insert(framebuffer, desc.clone());
        self.commands.push(DeviceCommand::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer);
        if self.framebuffer == FramebufferTarget::Framebuffer(framebuffer) {
            self.framebuffer = FramebufferTarget::Default;
        }
        self.commands.push(DeviceCommand::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget, draw_buffers: &[bool]) {
        self.framebuffer = target;
        self.commands
            .push(DeviceCommand::BindFramebuffer(target, draw_buffers.to_vec()));
    }

    fn clear_color(&mut self, slot: u32, color: [f32; 4]) {
        self.commands.push(DeviceCommand::ClearColor(slot, color));
    }

    fn clear_depth_stencil(&mut self, _depth: f32, _stencil: u8) {
        self.commands.push(DeviceCommand::ClearDepthStencil);
    }

    fn blit(
        &mut self,
        source: FramebufferTarget,
        destination: FramebufferTarget,
        _width: u32,
        _height: u32,
        mask: BlitMask,
    ) {
        self.commands.push(DeviceCommand::Blit {
            source,
            destination,
            mask,
        });
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.commands.push(DeviceCommand::SetViewport(width, height));
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        self.check(FailOp::Sampler)?;
        let sampler = SamplerHandle(self.allocate_id());
        self.samplers.insert(sampler, *desc);
        self.commands.push(DeviceCommand::CreateSampler(sampler));
        Ok(sampler)
    }

    fn delete_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(&sampler);
        self.commands.push(DeviceCommand::DeleteSampler(sampler));
    }

    fn bind_texture_unit(
        &mut self,
        unit: u32,
        texture: Option<TextureHandle>,
        sampler: Option<SamplerHandle>,
    ) {
        self.texture_units.insert(unit, (texture, sampler));
        self.commands
            .push(DeviceCommand::BindTextureUnit(unit, texture, sampler));
    }

    fn create_uniform_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        self.check(FailOp::Buffer)?;
        let buffer = BufferHandle(self.allocate_id());
        self.buffers.insert(buffer, vec![0; size]);
        self.commands
            .push(DeviceCommand::CreateUniformBuffer(buffer, size));
        Ok(buffer)
    }

    fn update_uniform_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        if let Some(storage) = self.buffers.get_mut(&buffer) {
            let n = data.len().min(storage.len());
            storage[..n].copy_from_slice(&data[..n]);
        }
        self.commands
            .push(DeviceCommand::UpdateUniformBuffer(buffer, data.len()));
    }

    fn bind_uniform_buffer(&mut self, binding: u32, buffer: Option<BufferHandle>) {
        self.uniform_buffer = buffer;
        self.commands
            .push(DeviceCommand::BindUniformBuffer(binding, buffer));
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.commands.push(DeviceCommand::DeleteBuffer(buffer));
    }

    fn create_program(&mut self, stages: &[(ShaderStage, &str)]) -> Result<ProgramHandle> {
        self.check(FailOp::Program)?;
        if self.validate {
            for (stage, source) in stages {
                validate_glsl(source, *stage)?;
            }
        }
        let program = ProgramHandle(self.allocate_id());
        self.programs.insert(
            program,
            HeadlessProgram {
                stages: stages
                    .iter()
                    .map(|(stage, source)| (*stage, source.to_string()))
                    .collect(),
            },
        );
        self.commands.push(DeviceCommand::CreateProgram(program));
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.commands.push(DeviceCommand::DeleteProgram(program));
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.program = program;
        self.commands.push(DeviceCommand::UseProgram(program));
    }

    fn set_pass_state(&mut self, state: &PassState) {
        self.pass_state = Some(*state);
        self.commands.push(DeviceCommand::SetPassState(*state));
    }

    fn set_raster_state(&mut self, state: &RasterState) {
        self.raster_state = Some(*state);
        self.commands.push(DeviceCommand::SetRasterState(*state));
    }

    fn draw_fullscreen_triangle(&mut self) {
        self.commands.push(DeviceCommand::Draw);
    }

    fn capture_state(&mut self) -> StateBlock {
        self.commands.push(DeviceCommand::CaptureState);
        StateBlock {
            framebuffer: Some(self.framebuffer),
            program: self.program,
            viewport: [0, 0, self.viewport.0, self.viewport.1],
            pass_state: self.pass_state,
            raster_state: self.raster_state,
            texture_units: self
                .texture_units
                .iter()
                .map(|(&unit, &(texture, sampler))| (unit, texture, sampler))
                .collect(),
            uniform_buffer: self.uniform_buffer,
        }
    }

    fn apply_state(&mut self, state: &StateBlock) {
        self.commands.push(DeviceCommand::ApplyState);
        self.framebuffer = state.framebuffer.unwrap_or(FramebufferTarget::Default);
        self.program = state.program;
        self.viewport = (state.viewport[2], state.viewport[3]);
        self.pass_state = state.pass_state;
        self.raster_state = state.raster_state;
        self.texture_units = state
            .texture_units
            .iter()
            .map(|&(unit, texture, sampler)| (unit, (texture, sampler)))
            .collect();
        self.uniform_buffer = state.uniform_buffer;
    }

    fn current_depth_attachment(&self) -> BoundDepth {
        match self.framebuffer {
            FramebufferTarget::Default => BoundDepth::DefaultFramebuffer,
            FramebufferTarget::Framebuffer(fb) => match self
                .framebuffers
                .get(&fb)
                .and_then(|desc| desc.depth_stencil)
            {
                Some(depth) => BoundDepth::Attachment {
                    framebuffer: fb.0,
                    key: depth_key(depth),
                },
                None => BoundDepth::None,
            },
        }
    }

    fn describe_attachment(&self, key: AttachmentKey, level: u32) -> Option<AttachmentInfo> {
        if let Some(info) = self.host_attachments.get(&key) {
            return Some(AttachmentInfo { level, ..*info });
        }
        match key.kind {
            AttachmentKind::Texture => {
                self.textures
                    .get(&TextureHandle(key.id))
                    .map(|t| AttachmentInfo {
                        width: (t.width >> level).max(1),
                        height: (t.height >> level).max(1),
                        level,
                        format: t.format,
                    })
            }
            AttachmentKind::Renderbuffer => self
                .renderbuffers
                .get(&RenderbufferHandle(key.id))
                .map(|&(width, height, format)| AttachmentInfo {
                    width,
                    height,
                    level: 0,
                    format,
                }),
        }
    }

    fn read_backbuffer(&mut self, width: u32, height: u32) -> Vec<u8> {
        let mut pixels = self.backbuffer.clone();
        pixels.resize(width as usize * height as usize * 4, 0);
        pixels
    }
}
