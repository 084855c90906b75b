//! Pass assembly: render targets, programs and fixed-function state per
//! technique pass.

use crate::ast::{self, BlendFactor, BlendOp, CompareFunc, PassStates, StencilOp};
use crate::compiler::ShaderStage;
use crate::config::MAX_RENDER_TARGETS;

use super::compile::EffectCompiler;
use super::device::{
    BlendEquation, BlendFunc, ColorAttachment, CompareOp, DepthAttachment, FramebufferDesc,
    FramebufferTarget, PassState, StencilAction, TextureHandle,
};
use super::resources::{Pass, StageSource, Technique, annotation_map};

// ── Literal → backend enum mapping ───────────────────────────────────────

pub fn compare_op(func: CompareFunc) -> CompareOp {
    match func {
        CompareFunc::Never => CompareOp::Never,
        CompareFunc::Less => CompareOp::Less,
        CompareFunc::Equal => CompareOp::Equal,
        CompareFunc::LessEqual => CompareOp::LessOrEqual,
        CompareFunc::Greater => CompareOp::Greater,
        CompareFunc::NotEqual => CompareOp::NotEqual,
        CompareFunc::GreaterEqual => CompareOp::GreaterOrEqual,
        CompareFunc::Always => CompareOp::Always,
    }
}

pub fn blend_equation(op: BlendOp) -> BlendEquation {
    match op {
        BlendOp::Add => BlendEquation::Add,
        BlendOp::Subtract => BlendEquation::Subtract,
        BlendOp::ReverseSubtract => BlendEquation::ReverseSubtract,
        BlendOp::Min => BlendEquation::Min,
        BlendOp::Max => BlendEquation::Max,
    }
}

pub fn blend_func(factor: BlendFactor) -> BlendFunc {
    match factor {
        BlendFactor::Zero => BlendFunc::Zero,
        BlendFactor::One => BlendFunc::One,
        BlendFactor::SrcColor => BlendFunc::SrcColor,
        BlendFactor::SrcAlpha => BlendFunc::SrcAlpha,
        BlendFactor::InvSrcColor => BlendFunc::OneMinusSrcColor,
        BlendFactor::InvSrcAlpha => BlendFunc::OneMinusSrcAlpha,
        BlendFactor::DestColor => BlendFunc::DstColor,
        BlendFactor::DestAlpha => BlendFunc::DstAlpha,
        BlendFactor::InvDestColor => BlendFunc::OneMinusDstColor,
        BlendFactor::InvDestAlpha => BlendFunc::OneMinusDstAlpha,
    }
}

/// Saturating ops clamp, the plain increment/decrement ops wrap.
pub fn stencil_action(op: StencilOp) -> StencilAction {
    match op {
        StencilOp::Keep => StencilAction::Keep,
        StencilOp::Zero => StencilAction::Zero,
        StencilOp::Replace => StencilAction::Replace,
        StencilOp::IncrSat => StencilAction::IncrementClamp,
        StencilOp::DecrSat => StencilAction::DecrementClamp,
        StencilOp::Invert => StencilAction::Invert,
        StencilOp::Incr => StencilAction::IncrementWrap,
        StencilOp::Decr => StencilAction::DecrementWrap,
    }
}

pub fn pass_state(states: &PassStates) -> PassState {
    let mask = states.color_write_mask;
    PassState {
        framebuffer_srgb: states.srgb_write_enable,
        color_write_mask: [
            mask & (1 << 0) != 0,
            mask & (1 << 1) != 0,
            mask & (1 << 2) != 0,
            mask & (1 << 3) != 0,
        ],
        blend_enable: states.blend_enable,
        blend_src: blend_func(states.src_blend),
        blend_dest: blend_func(states.dest_blend),
        blend_op_color: blend_equation(states.blend_op),
        blend_op_alpha: blend_equation(states.blend_op_alpha),
        depth_test: states.depth_enable,
        depth_write: states.depth_write_mask,
        depth_func: compare_op(states.depth_func),
        stencil_test: states.stencil_enable,
        stencil_func: compare_op(states.stencil_func),
        stencil_ref: states.stencil_ref,
        stencil_read_mask: states.stencil_read_mask,
        stencil_write_mask: states.stencil_write_mask,
        stencil_fail: stencil_action(states.stencil_fail),
        stencil_depth_fail: stencil_action(states.stencil_depth_fail),
        stencil_pass: stencil_action(states.stencil_pass),
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────

/// Where a pass draws to.
struct PassTarget {
    framebuffer: FramebufferTarget,
    owns_framebuffer: bool,
    draw_buffers: [bool; MAX_RENDER_TARGETS],
    draw_textures: Vec<TextureHandle>,
    viewport: (u32, u32),
}

impl EffectCompiler<'_> {
    pub(super) fn assemble_technique(&mut self, technique: &ast::Technique) {
        let annotations = annotation_map(&technique.annotations);
        let enabled = annotations
            .get("enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let mut passes = Vec::with_capacity(technique.passes.len());
        for pass in &technique.passes {
            if let Some(pass) = self.assemble_pass(&technique.name, pass) {
                passes.push(pass);
            }
        }

        self.effect.techniques.add(Technique {
            name: technique.name.clone(),
            annotations,
            enabled,
            passes,
        });
    }

    fn assemble_pass(&mut self, technique: &str, pass: &ast::Pass) -> Option<Pass> {
        let state = pass_state(&pass.states);
        let target = self.pass_target(pass, state.framebuffer_srgb)?;

        let mut stages = Vec::with_capacity(2);
        for (function, stage) in [
            (pass.states.vertex_shader, ShaderStage::Vertex),
            (pass.states.pixel_shader, ShaderStage::Fragment),
        ] {
            let Some(function) = function else { continue };
            let source = self.generator.stage_source(function, stage);
            log::trace!(
                "generated {technique}.{}.{} source:\n{source}",
                pass.name,
                stage.file_tag()
            );
            self.effect.sources.push(StageSource {
                technique: technique.to_string(),
                pass: pass.name.clone(),
                stage,
                source: source.clone(),
            });
            stages.push((stage, source));
        }

        if self.generator.diagnostics().has_errors() {
            self.release_target(&target);
            return None;
        }

        let stage_refs: Vec<(ShaderStage, &str)> = stages
            .iter()
            .map(|(stage, source)| (*stage, source.as_str()))
            .collect();
        let program = match self.device.create_program(&stage_refs) {
            Ok(program) => program,
            Err(e) => {
                self.generator.diagnostics_mut().backend_error(format!("{e:#}"));
                self.release_target(&target);
                return None;
            }
        };

        Some(Pass {
            name: pass.name.clone(),
            program,
            framebuffer: target.framebuffer,
            owns_framebuffer: target.owns_framebuffer,
            draw_buffers: target.draw_buffers,
            draw_textures: target.draw_textures,
            viewport: target.viewport,
            state,
        })
    }

    /// Resolves the pass's render targets. Without any, the pass draws to
    /// the backbuffer copy at the presentation surface's client size.
    fn pass_target(&mut self, pass: &ast::Pass, srgb: bool) -> Option<PassTarget> {
        let limit = self.config.max_render_targets.min(MAX_RENDER_TARGETS);
        let mut color = vec![None; MAX_RENDER_TARGETS];
        let mut draw_buffers = [false; MAX_RENDER_TARGETS];
        let mut draw_textures = Vec::new();
        let mut viewport: Option<(u32, u32)> = None;

        for (slot, name) in pass.states.render_targets.iter().enumerate().take(limit) {
            let Some(name) = name else { continue };
            let Some(texture) = self.effect.textures.get(name) else {
                self.generator.diagnostics_mut().error(
                    &pass.location,
                    format!("render target '{name}' does not name a texture"),
                );
                return None;
            };

            let size = (texture.width, texture.height);
            match viewport {
                Some(existing) if existing != size => {
                    self.generator.diagnostics_mut().error(
                        &pass.location,
                        "cannot use multiple rendertargets with different sized textures",
                    );
                    return None;
                }
                _ => viewport = Some(size),
            }

            let Some(view) = texture.view(self.surface, srgb) else {
                self.generator.diagnostics_mut().error(
                    &pass.location,
                    format!("render target '{name}' has no image to render to"),
                );
                return None;
            };
            color[slot] = Some(ColorAttachment::Texture(view));
            draw_buffers[slot] = true;
            draw_textures.push(view);
        }

        let Some(viewport) = viewport else {
            let mut draw_buffers = [false; MAX_RENDER_TARGETS];
            draw_buffers[0] = true;
            return Some(PassTarget {
                framebuffer: FramebufferTarget::Framebuffer(self.surface.backbuffer_framebuffer),
                owns_framebuffer: false,
                draw_buffers,
                draw_textures: vec![self.surface.backbuffer_texture_srgb],
                viewport: self.device.client_size(),
            });
        };

        let desc = FramebufferDesc {
            color,
            depth_stencil: Some(DepthAttachment::Renderbuffer(self.surface.backbuffer_depth)),
        };
        match self.device.create_framebuffer(&desc) {
            Ok(fb) => Some(PassTarget {
                framebuffer: FramebufferTarget::Framebuffer(fb),
                owns_framebuffer: true,
                draw_buffers,
                draw_textures,
                viewport,
            }),
            Err(e) => {
                self.generator.diagnostics_mut().error(
                    &pass.location,
                    format!("failed to create framebuffer for pass '{}': {e:#}", pass.name),
                );
                None
            }
        }
    }

    fn release_target(&mut self, target: &PassTarget) {
        if target.owns_framebuffer {
            if let FramebufferTarget::Framebuffer(fb) = target.framebuffer {
                self.device.delete_framebuffer(fb);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pass_state() {
        let state = pass_state(&PassStates::default());
        assert_eq!(state.color_write_mask, [true; 4]);
        assert!(!state.blend_enable);
        assert_eq!(state.blend_src, BlendFunc::One);
        assert_eq!(state.blend_dest, BlendFunc::Zero);
        assert!(state.depth_write);
        assert_eq!(state.depth_func, CompareOp::Less);
        assert_eq!(state.stencil_func, CompareOp::Always);
        assert_eq!(state.stencil_read_mask, 0xFF);
    }

    #[test]
    fn test_write_mask_bits() {
        let states = PassStates {
            color_write_mask: 0b0101,
            ..Default::default()
        };
        assert_eq!(pass_state(&states).color_write_mask, [true, false, true, false]);
    }

    #[test]
    fn test_stencil_ops_clamp_or_wrap() {
        assert_eq!(stencil_action(StencilOp::IncrSat), StencilAction::IncrementClamp);
        assert_eq!(stencil_action(StencilOp::Incr), StencilAction::IncrementWrap);
        assert_eq!(stencil_action(StencilOp::DecrSat), StencilAction::DecrementClamp);
        assert_eq!(blend_func(BlendFactor::InvDestAlpha), BlendFunc::OneMinusDstAlpha);
        assert_eq!(blend_equation(BlendOp::ReverseSubtract), BlendEquation::ReverseSubtract);
    }
}
