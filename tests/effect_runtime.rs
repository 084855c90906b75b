use std::path::PathBuf;

use fx_forge::{
    ast::{
        BaseClass, Function, FunctionId, Location, NodeTree, Pass, PassStates, Properties,
        Qualifiers, Statement, Technique, Type, Variable,
    },
    compiler::ShaderStage,
    config::RuntimeConfig,
    runtime::{
        AttachmentPoint, DepthSourceKey, EffectRuntime, HeadlessDevice,
        device::{
            AttachmentInfo, AttachmentKey, BlitMask, DepthAttachment, DeviceFormat,
            FramebufferDesc, FramebufferTarget, GraphicsDevice,
        },
        headless::DeviceCommand,
    },
};

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn load_case(name: &str) -> NodeTree {
    let path = manifest_dir().join("tests").join("cases").join(name);
    NodeTree::load_from_path(&path)
        .unwrap_or_else(|e| panic!("failed to load {}: {e:#}", path.display()))
}

fn runtime(width: u32, height: u32) -> EffectRuntime<HeadlessDevice> {
    let mut runtime = EffectRuntime::new(HeadlessDevice::new(width, height), RuntimeConfig::default());
    runtime.init(width, height).expect("init");
    runtime
}

fn compiled_blur() -> EffectRuntime<HeadlessDevice> {
    let mut runtime = runtime(1280, 720);
    let report = runtime.compile(&load_case("two_pass_blur.json")).expect("compile");
    assert!(report.warnings.is_empty(), "unexpected warnings: {}", report.warnings);
    runtime
}

fn command_name(command: &DeviceCommand) -> &'static str {
    match command {
        DeviceCommand::CreateTexture { .. } => "CreateTexture",
        DeviceCommand::CreateTextureView { .. } => "CreateTextureView",
        DeviceCommand::DeleteTexture(_) => "DeleteTexture",
        DeviceCommand::UploadTexture { .. } => "UploadTexture",
        DeviceCommand::GenerateMipmaps(_) => "GenerateMipmaps",
        DeviceCommand::ClearTexture(..) => "ClearTexture",
        DeviceCommand::CreateRenderbuffer(_) => "CreateRenderbuffer",
        DeviceCommand::DeleteRenderbuffer(_) => "DeleteRenderbuffer",
        DeviceCommand::CreateFramebuffer(_) => "CreateFramebuffer",
        DeviceCommand::DeleteFramebuffer(_) => "DeleteFramebuffer",
        DeviceCommand::BindFramebuffer(..) => "BindFramebuffer",
        DeviceCommand::ClearColor(..) => "ClearColor",
        DeviceCommand::ClearDepthStencil => "ClearDepthStencil",
        DeviceCommand::Blit { .. } => "Blit",
        DeviceCommand::SetViewport(..) => "SetViewport",
        DeviceCommand::CreateSampler(_) => "CreateSampler",
        DeviceCommand::DeleteSampler(_) => "DeleteSampler",
        DeviceCommand::BindTextureUnit(..) => "BindTextureUnit",
        DeviceCommand::CreateUniformBuffer(..) => "CreateUniformBuffer",
        DeviceCommand::UpdateUniformBuffer(..) => "UpdateUniformBuffer",
        DeviceCommand::BindUniformBuffer(..) => "BindUniformBuffer",
        DeviceCommand::DeleteBuffer(_) => "DeleteBuffer",
        DeviceCommand::CreateProgram(_) => "CreateProgram",
        DeviceCommand::DeleteProgram(_) => "DeleteProgram",
        DeviceCommand::UseProgram(_) => "UseProgram",
        DeviceCommand::SetPassState(_) => "SetPassState",
        DeviceCommand::SetRasterState(_) => "SetRasterState",
        DeviceCommand::Draw => "Draw",
        DeviceCommand::CaptureState => "CaptureState",
        DeviceCommand::ApplyState => "ApplyState",
    }
}

fn fullscreen_vs() -> Function {
    Function {
        name: "VS".to_string(),
        namespace: String::new(),
        return_type: Type::void(),
        return_semantic: String::new(),
        parameters: vec![
            Variable::new(
                "pos",
                Type::vector(BaseClass::Float, 4).with_qualifiers(Qualifiers::OUT),
            )
            .with_semantic("SV_Position"),
        ],
        definition: Some(Statement::Compound { statements: vec![] }),
        location: Default::default(),
    }
}

fn color_ps() -> Function {
    Function {
        name: "PS".to_string(),
        namespace: String::new(),
        return_type: Type::vector(BaseClass::Float, 4),
        return_semantic: "SV_Target".to_string(),
        parameters: vec![],
        definition: Some(Statement::Compound { statements: vec![] }),
        location: Default::default(),
    }
}

fn render_texture(name: &str, size: u32) -> Variable {
    let mut var = Variable::new(name, Type::scalar(BaseClass::Texture));
    var.properties = Properties {
        width: size,
        height: size,
        ..Default::default()
    };
    var
}

fn mismatched_targets_tree() -> NodeTree {
    let mut states = PassStates {
        vertex_shader: Some(FunctionId(0)),
        pixel_shader: Some(FunctionId(1)),
        ..Default::default()
    };
    states.render_targets[0] = Some("Large".to_string());
    states.render_targets[1] = Some("Small".to_string());
    NodeTree {
        uniforms: vec![render_texture("Large", 256), render_texture("Small", 128)],
        functions: vec![fullscreen_vs(), color_ps()],
        techniques: vec![Technique {
            name: "Broken".to_string(),
            annotations: vec![],
            passes: vec![Pass {
                name: "P0".to_string(),
                location: Location::new("broken.fx", 12, 5),
                states,
            }],
            location: Default::default(),
        }],
        ..Default::default()
    }
}

// ── Compilation scenarios ──

#[test]
fn pass_without_targets_uses_backbuffer_viewport() {
    let runtime = compiled_blur();
    let surface = runtime.surface().expect("surface");
    let blur = runtime.technique("Blur").expect("Blur technique");
    assert!(blur.enabled);
    assert_eq!(blur.passes.len(), 2);

    let horizontal = &blur.passes[0];
    assert_eq!(horizontal.viewport, (256, 256));
    assert!(horizontal.owns_framebuffer);
    assert!(horizontal.draw_buffers[0]);

    let combine = &blur.passes[1];
    assert_eq!(combine.viewport, (1280, 720));
    assert!(!combine.owns_framebuffer);
    assert_eq!(
        combine.framebuffer,
        FramebufferTarget::Framebuffer(surface.backbuffer_framebuffer)
    );
    assert_eq!(combine.draw_textures, vec![surface.backbuffer_texture_srgb]);
    assert!(combine.state.framebuffer_srgb);
    assert!(combine.state.blend_enable);

    let disabled = runtime.technique("Disabled").expect("Disabled technique");
    assert!(!disabled.enabled);
}

#[test]
fn render_target_framebuffer_binds_shared_depth() {
    let runtime = compiled_blur();
    let surface = runtime.surface().expect("surface");
    let pass = &runtime.technique("Blur").unwrap().passes[0];
    let FramebufferTarget::Framebuffer(fb) = pass.framebuffer else {
        panic!("expected an owned framebuffer");
    };
    let desc = runtime.device().framebuffer(fb).expect("framebuffer exists");
    assert_eq!(
        desc.depth_stencil,
        Some(DepthAttachment::Renderbuffer(surface.backbuffer_depth))
    );
}

#[test]
fn mismatched_render_target_sizes_fail_without_programs() {
    let mut runtime = runtime(1280, 720);
    let surface_objects = runtime.device().live_objects();

    let err = runtime
        .compile(&mismatched_targets_tree())
        .expect_err("compile must fail");
    let text = format!("{err:#}");
    assert!(text.contains("different sized textures"), "{text}");
    assert!(text.contains("broken.fx(12, 5): error:"), "{text}");

    assert_eq!(runtime.device().program_count(), 0);
    assert_eq!(runtime.device().live_objects(), surface_objects);
    assert!(runtime.effect().is_none());
}

#[test]
fn failed_compile_keeps_previous_effect() {
    let mut runtime = compiled_blur();
    let programs = runtime.device().program_count();
    assert!(runtime.compile(&mismatched_targets_tree()).is_err());
    assert!(runtime.technique("Blur").is_some());
    assert_eq!(runtime.device().program_count(), programs);
}

#[test]
fn uniforms_pack_float_then_vec4() {
    let runtime = compiled_blur();
    let strength = runtime.uniform("Strength").expect("Strength");
    let tint = runtime.uniform("Tint").expect("Tint");
    assert_eq!((strength.offset, strength.size), (0, 4));
    assert_eq!((tint.offset, tint.size), (16, 16));
    assert_eq!(runtime.uniform_storage().len(), 32);
    assert_eq!(runtime.uniform_value("Strength"), Some(&0.5f32.to_ne_bytes()[..]));
    assert_eq!(runtime.uniform_value("Tint"), Some(&[0u8; 16][..]));
}

#[test]
fn generated_sources_share_globals_and_interface() {
    let runtime = compiled_blur();
    let effect = runtime.effect().expect("effect");
    assert_eq!(effect.sources.len(), 6);

    let fragment = effect
        .sources
        .iter()
        .find(|s| s.pass == "Combine" && s.stage == ShaderStage::Fragment)
        .expect("Combine fragment source");
    assert!(fragment.source.contains("layout(binding = 0) uniform sampler2D BackBuffer;\n"));
    assert!(fragment.source.contains("layout(binding = 1) uniform sampler2D BlurredSampler;\n"));
    assert!(fragment.source.contains("uniform _GLOBAL_"));
    assert!(fragment.source.contains("float Strength;\n"));
    assert!(fragment.source.contains("layout(location = 1) in vec2 _param_texcoord;\n"));

    let vertex = effect
        .sources
        .iter()
        .find(|s| s.pass == "Combine" && s.stage == ShaderStage::Vertex)
        .expect("Combine vertex source");
    assert!(vertex.source.contains("layout(location = 1) out vec2 _param_texcoord;\n"));
    assert!(vertex.source.contains("#define discard\n"));
}

#[test]
fn blur_fixture_compiles_with_glsl_validation() {
    let device = HeadlessDevice::new(1280, 720).with_validation(true);
    let mut runtime = EffectRuntime::new(device, RuntimeConfig::default());
    runtime.init(1280, 720).expect("init");

    let report = runtime
        .compile(&load_case("two_pass_blur.json"))
        .unwrap_or_else(|e| panic!("validated compile failed: {e:#}"));
    assert!(report.warnings.is_empty(), "unexpected warnings: {}", report.warnings);
    assert!(runtime.device().program_count() > 0);

    let effect = runtime.effect().expect("effect");
    for source in &effect.sources {
        fx_forge::compiler::validate_glsl_with_context(&source.source, source.stage, &source.pass)
            .unwrap_or_else(|e| panic!("{e:#}"));
    }
}

// ── Frame execution ──

#[test]
fn present_runs_passes_in_order_between_state_capture_and_restore() {
    let mut runtime = compiled_blur();
    runtime.on_draw_call(3);
    runtime.device_mut().take_commands();

    assert_eq!(runtime.present(), 2);

    let names: Vec<&str> = runtime.device().commands().iter().map(command_name).collect();
    assert_eq!(
        names,
        vec![
            "CaptureState",
            "Blit",
            "Blit",
            "BindTextureUnit",
            "BindTextureUnit",
            "BindUniformBuffer",
            "BindFramebuffer",
            "ClearDepthStencil",
            "UpdateUniformBuffer",
            // Horizontal
            "UseProgram",
            "SetPassState",
            "SetRasterState",
            "Blit",
            "BindFramebuffer",
            "SetViewport",
            "ClearColor",
            "Draw",
            "GenerateMipmaps",
            // Combine
            "UseProgram",
            "SetPassState",
            "SetRasterState",
            "Blit",
            "BindFramebuffer",
            "SetViewport",
            "ClearColor",
            "Draw",
            "Blit",
            "SetViewport",
            "ApplyState",
        ]
    );

    let surface = runtime.surface().unwrap();
    let commands = runtime.device().commands();
    assert_eq!(
        commands[1],
        DeviceCommand::Blit {
            source: FramebufferTarget::Default,
            destination: FramebufferTarget::Framebuffer(surface.backbuffer_framebuffer),
            mask: BlitMask::COLOR,
        }
    );
    assert_eq!(
        commands[3],
        DeviceCommand::BindTextureUnit(
            0,
            Some(surface.backbuffer_texture_srgb),
            Some(runtime.effect().unwrap().samplers[0].handle)
        )
    );
    assert_eq!(commands[14], DeviceCommand::SetViewport(256, 256));
    assert_eq!(commands[23], DeviceCommand::SetViewport(1280, 720));
    assert_eq!(runtime.stats().draw_calls, 0);
    assert_eq!(runtime.frame_count(), 1);
}

#[test]
fn enabling_a_technique_adds_its_passes() {
    let mut runtime = compiled_blur();
    assert!(runtime.set_technique_enabled("Disabled", true));
    assert!(!runtime.set_technique_enabled("Missing", true));
    runtime.on_draw_call(3);
    assert_eq!(runtime.present(), 3);
}

#[test]
fn uniform_writes_reach_the_buffer_on_present() {
    let mut runtime = compiled_blur();
    runtime
        .set_uniform_value("Strength", &2.0f32.to_ne_bytes())
        .expect("write Strength");
    assert!(runtime.set_uniform_value("Strength", &[0u8; 8]).is_err());
    assert!(runtime.set_uniform_value("Nope", &[0u8; 4]).is_err());

    runtime.on_draw_call(3);
    runtime.present();

    let buffer = runtime.effect().unwrap().uniform_buffer.expect("uniform buffer");
    let contents = runtime.device().buffer(buffer).expect("buffer contents");
    assert_eq!(&contents[..4], &2.0f32.to_ne_bytes());
}

#[test]
fn depth_source_switches_to_busiest_host_attachment() {
    let mut runtime = compiled_blur();
    let key = AttachmentKey::renderbuffer(5000);
    runtime.device_mut().add_host_attachment(
        key,
        AttachmentInfo {
            width: 1280,
            height: 720,
            level: 0,
            format: DeviceFormat::Depth32F,
        },
    );
    runtime.on_framebuffer_attachment(77, AttachmentPoint::Depth, key, 0);

    let scene_fb = runtime
        .device_mut()
        .create_framebuffer(&FramebufferDesc {
            color: vec![],
            depth_stencil: Some(DepthAttachment::Host(key, 0)),
        })
        .expect("host framebuffer");
    runtime
        .device_mut()
        .bind_framebuffer(FramebufferTarget::Framebuffer(scene_fb), &[]);
    for _ in 0..20 {
        runtime.on_draw_call(3000);
    }
    runtime
        .device_mut()
        .bind_framebuffer(FramebufferTarget::Default, &[true]);
    runtime.on_draw_call(3);
    runtime.device_mut().take_commands();

    runtime.present();

    assert_eq!(
        runtime.depth_sources().current(),
        DepthSourceKey::Attachment(key)
    );
    let surface = runtime.surface().unwrap();
    let depth_texture = surface.depth_texture.expect("depth texture");
    assert_eq!(
        runtime.device().texture(depth_texture).map(|t| t.format),
        Some(DeviceFormat::Depth32F)
    );
    let source_fb = surface.depth_source_framebuffer.expect("depth source framebuffer");
    assert!(runtime.device().commands().contains(&DeviceCommand::Blit {
        source: FramebufferTarget::Framebuffer(source_fb),
        destination: FramebufferTarget::Framebuffer(surface.blit_framebuffer),
        mask: BlitMask::DEPTH,
    }));
}

#[test]
fn draws_into_internal_framebuffers_are_not_counted() {
    let mut runtime = compiled_blur();
    let blit = runtime.surface().unwrap().blit_framebuffer;
    runtime
        .device_mut()
        .bind_framebuffer(FramebufferTarget::Framebuffer(blit), &[true]);
    runtime.on_draw_call(300);
    assert_eq!(runtime.stats().draw_calls, 1);
    runtime.present();
    assert_eq!(runtime.depth_sources().current(), DepthSourceKey::Default);
}

// ── Lifecycle and resources ──

#[test]
fn resize_recompiles_with_new_surface_size() {
    let mut runtime = compiled_blur();
    runtime.device_mut().set_client_size(640, 360);
    runtime.resize(640, 360).expect("resize");

    let surface = runtime.surface().unwrap();
    assert_eq!((surface.width, surface.height), (640, 360));
    let combine = &runtime.technique("Blur").unwrap().passes[1];
    assert_eq!(combine.viewport, (640, 360));
    assert_eq!(
        runtime.texture("BackBufferTex").map(|t| (t.width, t.height)),
        Some((640, 360))
    );
}

#[test]
fn update_texture_flips_rows_and_regenerates_mipmaps() {
    let mut runtime = compiled_blur();
    let mut data = vec![0u8; 256 * 256 * 4];
    data[..4].copy_from_slice(&[9, 8, 7, 6]);
    runtime.device_mut().take_commands();

    runtime.update_texture("Blurred", &data).expect("update");

    let (primary, _) = runtime.texture("Blurred").unwrap().storage.unwrap();
    let uploaded = &runtime.device().texture(primary).unwrap().data;
    let last_row = 255 * 256 * 4;
    assert_eq!(&uploaded[last_row..last_row + 4], &[9, 8, 7, 6]);
    assert_eq!(&uploaded[..4], &[0, 0, 0, 0]);
    assert!(runtime
        .device()
        .commands()
        .contains(&DeviceCommand::GenerateMipmaps(primary)));
}

#[test]
fn update_texture_rejects_special_textures_and_bad_sizes() {
    let mut runtime = compiled_blur();
    assert!(runtime.update_texture("BackBufferTex", &[0; 16]).is_err());
    assert!(runtime.update_texture("Blurred", &[0; 16]).is_err());
    assert!(runtime.update_texture("Missing", &[0; 16]).is_err());
}

#[test]
fn screenshot_is_top_down_and_opaque() {
    let mut runtime = runtime(2, 2);
    runtime.device_mut().set_backbuffer_pixels(vec![
        1, 1, 1, 0, 2, 2, 2, 0, // bottom row
        3, 3, 3, 0, 4, 4, 4, 0, // top row
    ]);
    let image = runtime.screenshot().expect("screenshot");
    assert_eq!(image.get_pixel(0, 0).0, [3, 3, 3, 255]);
    assert_eq!(image.get_pixel(1, 1).0, [2, 2, 2, 255]);
}

#[test]
fn annotations_are_kept_by_name() {
    let runtime = compiled_blur();
    let blurred = runtime.texture("Blurred").expect("Blurred");
    assert_eq!(
        blurred.annotations.get("source"),
        Some(&fx_forge::ast::LiteralValue::String("blur.png".to_string()))
    );
    assert_eq!(blurred.levels, 4);
}
