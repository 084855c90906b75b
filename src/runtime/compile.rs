//! Effect compilation: code generation, resource binding and pass assembly
//! over one node tree.
//!
//! Compilation either produces a complete [`CompiledEffect`] or fails with
//! every backend object it created released again.

use anyhow::{Result, bail};

use crate::ast::{BaseClass, NodeTree, Qualifiers};
use crate::compiler::CodeGenerator;
use crate::config::RuntimeConfig;

use super::device::{BufferHandle, FramebufferTarget, GraphicsDevice};
use super::resources::{
    ResourceTable, Sampler, StageSource, SurfaceResources, Technique, Texture, TextureSource,
    Uniform,
};
use super::uniform_layout::UniformLayout;

/// Everything one successfully compiled effect owns.
#[derive(Debug, Default)]
pub struct CompiledEffect {
    pub textures: ResourceTable<Texture>,
    /// In binding order: sampler `i` is bound to texture unit `i`.
    pub samplers: Vec<Sampler>,
    pub uniforms: ResourceTable<Uniform>,
    pub techniques: ResourceTable<Technique>,
    pub uniform_storage: Vec<u8>,
    pub uniform_buffer: Option<BufferHandle>,
    pub sources: Vec<StageSource>,
}

impl CompiledEffect {
    /// Deletes every backend object the effect owns. Shared surfaces are
    /// left alone.
    pub fn release(self, device: &mut dyn GraphicsDevice) {
        for technique in self.techniques.iter() {
            for pass in &technique.passes {
                device.delete_program(pass.program);
                if pass.owns_framebuffer {
                    if let FramebufferTarget::Framebuffer(fb) = pass.framebuffer {
                        device.delete_framebuffer(fb);
                    }
                }
            }
        }
        for sampler in &self.samplers {
            device.delete_sampler(sampler.handle);
        }
        for texture in self.textures.iter() {
            if texture.source != TextureSource::Memory {
                continue;
            }
            if let Some((primary, alternate)) = texture.storage {
                if let Some(view) = alternate {
                    device.delete_texture(view);
                }
                device.delete_texture(primary);
            }
        }
        if let Some(buffer) = self.uniform_buffer {
            device.delete_buffer(buffer);
        }
    }

    pub fn has_uniforms(&self) -> bool {
        !self.uniform_storage.is_empty()
    }
}

/// Outcome of a successful compile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Accumulated warnings, one per line. Empty when there were none.
    pub warnings: String,
}

/// Walks one node tree, creating backend objects as it goes.
///
/// The binder rules live in `binder.rs` and the pass assembler in
/// `pipeline.rs`; both are `impl` blocks on this type.
pub struct EffectCompiler<'a> {
    pub(super) tree: &'a NodeTree,
    pub(super) generator: CodeGenerator<'a>,
    pub(super) config: &'a RuntimeConfig,
    pub(super) surface: &'a SurfaceResources,
    pub(super) device: &'a mut dyn GraphicsDevice,
    pub(super) effect: CompiledEffect,
    pub(super) layout: UniformLayout,
}

impl<'a> EffectCompiler<'a> {
    pub fn new(
        tree: &'a NodeTree,
        config: &'a RuntimeConfig,
        surface: &'a SurfaceResources,
        device: &'a mut dyn GraphicsDevice,
    ) -> Self {
        Self {
            tree,
            generator: CodeGenerator::new(tree),
            config,
            surface,
            device,
            effect: CompiledEffect::default(),
            layout: UniformLayout::new(),
        }
    }

    /// Runs the whole compile. On failure the error message is the full
    /// diagnostics text and nothing created here stays allocated.
    pub fn compile(mut self) -> Result<(CompiledEffect, CompileReport)> {
        let tree = self.tree;
        self.generator.emit_structs();

        for var in &tree.uniforms {
            match var.ty.base {
                BaseClass::Texture => self.bind_texture(var),
                BaseClass::Sampler => self.bind_sampler(var),
                _ if var.ty.has(Qualifiers::UNIFORM) => self.bind_uniform(var),
                _ => self.generator.emit_global(var),
            }
        }

        self.generator.emit_functions();

        for technique in &tree.techniques {
            self.assemble_technique(technique);
        }

        if self.layout.cursor() != 0 {
            match self.device.create_uniform_buffer(self.effect.uniform_storage.len()) {
                Ok(buffer) => {
                    self.device
                        .update_uniform_buffer(buffer, &self.effect.uniform_storage);
                    self.effect.uniform_buffer = Some(buffer);
                }
                Err(e) => self
                    .generator
                    .diagnostics_mut()
                    .backend_error(format!("failed to create uniform buffer: {e:#}")),
            }
        }

        let diagnostics = self.generator.into_diagnostics();
        if diagnostics.has_errors() {
            log::debug!(
                "effect compilation failed with {} error(s)",
                diagnostics.error_count()
            );
            self.effect.release(self.device);
            bail!("{}", diagnostics.text());
        }

        log::debug!(
            "compiled effect: {} technique(s), {} texture(s), {} sampler(s), {} uniform byte(s)",
            self.effect.techniques.len(),
            self.effect.textures.len(),
            self.effect.samplers.len(),
            self.effect.uniform_storage.len()
        );
        Ok((
            self.effect,
            CompileReport {
                warnings: diagnostics.text(),
            },
        ))
    }
}

/// Compiles `tree` against the shared `surface`.
pub fn compile_effect(
    device: &mut dyn GraphicsDevice,
    surface: &SurfaceResources,
    tree: &NodeTree,
    config: &RuntimeConfig,
) -> Result<(CompiledEffect, CompileReport)> {
    EffectCompiler::new(tree, config, surface, device).compile()
}
