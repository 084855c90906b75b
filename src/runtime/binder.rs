//! Resource binding: textures, samplers and uniforms declared as globals.

use crate::ast::{AddressMode, ExpressionKind, Filter, PixelFormat, Properties, Variable};

use super::compile::EffectCompiler;
use super::device::{self, DeviceFormat, MagFilter, MinFilter, SamplerDesc};
use super::resources::{Sampler, Texture, TextureSource, Uniform, annotation_map};
use super::uniform_layout::storage_size;

fn is_color_semantic(semantic: &str) -> bool {
    semantic.eq_ignore_ascii_case("COLOR") || semantic.eq_ignore_ascii_case("SV_TARGET")
}

fn is_depth_semantic(semantic: &str) -> bool {
    semantic.eq_ignore_ascii_case("DEPTH") || semantic.eq_ignore_ascii_case("SV_DEPTH")
}

fn address_mode(mode: AddressMode) -> device::AddressMode {
    match mode {
        AddressMode::Wrap => device::AddressMode::Repeat,
        AddressMode::Mirror => device::AddressMode::MirroredRepeat,
        AddressMode::Clamp => device::AddressMode::ClampToEdge,
        AddressMode::Border => device::AddressMode::ClampToBorder,
    }
}

/// Combines the separate min and mip filters into one minification mode.
/// Anisotropic filtering counts as linear for both.
pub fn min_filter(min: Filter, mip: Filter) -> MinFilter {
    match (min == Filter::Point, mip == Filter::Point) {
        (true, true) => MinFilter::NearestMipmapNearest,
        (true, false) => MinFilter::NearestMipmapLinear,
        (false, true) => MinFilter::LinearMipmapNearest,
        (false, false) => MinFilter::LinearMipmapLinear,
    }
}

pub fn sampler_desc(props: &Properties) -> SamplerDesc {
    SamplerDesc {
        address: [
            address_mode(props.address_u),
            address_mode(props.address_v),
            address_mode(props.address_w),
        ],
        min_filter: min_filter(props.min_filter, props.mip_filter),
        mag_filter: match props.mag_filter {
            Filter::Point => MagFilter::Nearest,
            _ => MagFilter::Linear,
        },
        lod_bias: props.mip_lod_bias,
        min_lod: props.min_lod,
        max_lod: props.max_lod,
        max_anisotropy: props.max_anisotropy as f32,
    }
}

impl EffectCompiler<'_> {
    pub(super) fn bind_texture(&mut self, var: &Variable) {
        let props = &var.properties;
        let mut levels = props.mip_levels;
        if levels == 0 {
            self.generator.diagnostics_mut().warning(
                &var.location,
                "a texture cannot have 0 miplevels, changed it to 1",
            );
            levels = 1;
        }

        let customized = props.width != 1
            || props.height != 1
            || levels != 1
            || props.format != PixelFormat::Rgba8;

        let special = if is_color_semantic(&var.semantic) {
            Some((TextureSource::BackBuffer, "backbuffer"))
        } else if is_depth_semantic(&var.semantic) {
            Some((TextureSource::DepthStencil, "depthbuffer"))
        } else {
            None
        };

        let texture = match special {
            Some((source, label)) => {
                if customized {
                    self.generator.diagnostics_mut().warning(
                        &var.location,
                        format!("texture property on {label} textures are ignored"),
                    );
                }
                Texture {
                    name: var.name.clone(),
                    width: self.surface.width,
                    height: self.surface.height,
                    levels: 1,
                    format: PixelFormat::Rgba8,
                    source,
                    storage: None,
                    annotations: annotation_map(&var.annotations),
                }
            }
            None => {
                let (primary_format, srgb_format) = DeviceFormat::for_pixel_format(props.format);
                let storage = self
                    .device
                    .create_texture(props.width, props.height, levels, primary_format)
                    .and_then(|primary| {
                        let alternate = match srgb_format {
                            Some(format) => match self.device.create_texture_view(primary, format) {
                                Ok(view) => Some(view),
                                Err(e) => {
                                    self.device.delete_texture(primary);
                                    return Err(e);
                                }
                            },
                            None => None,
                        };
                        Ok((primary, alternate))
                    });
                let storage = match storage {
                    Ok(storage) => storage,
                    Err(e) => {
                        self.generator.diagnostics_mut().error(
                            &var.location,
                            format!("failed to create texture '{}': {e:#}", var.name),
                        );
                        return;
                    }
                };
                self.device.clear_texture(storage.0, [0.0; 4]);
                Texture {
                    name: var.name.clone(),
                    width: props.width,
                    height: props.height,
                    levels,
                    format: props.format,
                    source: TextureSource::Memory,
                    storage: Some(storage),
                    annotations: annotation_map(&var.annotations),
                }
            }
        };

        self.effect.textures.add(texture);
    }

    pub(super) fn bind_sampler(&mut self, var: &Variable) {
        let Some(texture_name) = var.properties.texture.as_deref() else {
            self.generator.diagnostics_mut().error(
                &var.location,
                format!("sampler '{}' is missing required 'Texture' property", var.name),
            );
            return;
        };
        if self.effect.textures.get(texture_name).is_none() {
            self.generator.diagnostics_mut().error(
                &var.location,
                format!(
                    "sampler '{}' references undefined texture '{texture_name}'",
                    var.name
                ),
            );
            return;
        }

        let handle = match self.device.create_sampler(&sampler_desc(&var.properties)) {
            Ok(handle) => handle,
            Err(e) => {
                self.generator.diagnostics_mut().error(
                    &var.location,
                    format!("failed to create sampler '{}': {e:#}", var.name),
                );
                return;
            }
        };

        let binding = self.effect.samplers.len() as u32;
        self.generator.declare_sampler(var, binding);
        self.effect.samplers.push(Sampler {
            handle,
            texture: texture_name.to_string(),
            srgb: var.properties.srgb_texture,
        });
    }

    pub(super) fn bind_uniform(&mut self, var: &Variable) {
        self.generator.declare_uniform(var);

        let size = storage_size(&var.ty);
        let offset = self.layout.place(size);
        let storage = &mut self.effect.uniform_storage;
        if self.layout.size() > storage.len() {
            storage.resize(self.layout.size(), 0);
        }

        let target = &mut storage[offset..offset + size];
        match var.initializer.as_ref().map(|init| &init.kind) {
            Some(ExpressionKind::Literal { value }) => {
                let bytes = value.to_bytes();
                let n = bytes.len().min(size);
                target[..n].copy_from_slice(&bytes[..n]);
                target[n..].fill(0);
            }
            _ => target.fill(0),
        }

        self.effect.uniforms.add(Uniform {
            name: var.name.clone(),
            ty: var.ty.clone(),
            offset,
            size,
            annotations: annotation_map(&var.annotations),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_combinations() {
        assert_eq!(
            min_filter(Filter::Point, Filter::Point),
            MinFilter::NearestMipmapNearest
        );
        assert_eq!(
            min_filter(Filter::Point, Filter::Linear),
            MinFilter::NearestMipmapLinear
        );
        assert_eq!(
            min_filter(Filter::Linear, Filter::Point),
            MinFilter::LinearMipmapNearest
        );
        assert_eq!(
            min_filter(Filter::Anisotropic, Filter::Anisotropic),
            MinFilter::LinearMipmapLinear
        );
    }

    #[test]
    fn test_sampler_desc_from_properties() {
        let props = Properties {
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Mirror,
            address_w: AddressMode::Border,
            mag_filter: Filter::Point,
            max_anisotropy: 8,
            ..Default::default()
        };
        let desc = sampler_desc(&props);
        assert_eq!(
            desc.address,
            [
                device::AddressMode::Repeat,
                device::AddressMode::MirroredRepeat,
                device::AddressMode::ClampToBorder
            ]
        );
        assert_eq!(desc.mag_filter, MagFilter::Nearest);
        assert_eq!(desc.max_anisotropy, 8.0);
        assert_eq!(desc.min_lod, -1000.0);
    }

    #[test]
    fn test_special_semantics() {
        assert!(is_color_semantic("SV_Target"));
        assert!(is_color_semantic("COLOR"));
        assert!(is_depth_semantic("SV_DEPTH"));
        assert!(!is_depth_semantic("TEXCOORD0"));
    }
}
