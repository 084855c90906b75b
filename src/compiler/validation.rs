//! GLSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

use super::ShaderStage;

/// Parse and validate a generated GLSL stage with naga's GLSL frontend.
///
/// naga only understands a subset of GLSL 4.50, so this is a smoke check for
/// generated sources rather than a replacement for the driver's compiler.
/// Combined `sampler2D` uniforms are split into a texture and sampler pair
/// before parsing. Functions taking `sampler2D` parameters and
/// `matrixCompMult` are still rejected.
///
/// # Example
/// ```ignore
/// let glsl = "#version 450\nlayout(location = 0) out vec4 c;\nvoid main() { c = vec4(1.0); }\n";
/// validate_glsl(glsl, ShaderStage::Fragment)?;
/// ```
pub fn validate_glsl(source: &str, stage: ShaderStage) -> Result<naga::Module> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };

    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options {
        stage: naga_stage,
        defines: Default::default(),
    };

    let module = frontend
        .parse(&options, &split_combined_samplers(source))
        .map_err(|e| anyhow!("GLSL parse failed:\n  {e:?}\n{}", numbered_source(source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("GLSL validation failed:\n  {e:?}\n{}", numbered_source(source)))?;

    Ok(module)
}

/// Validate GLSL and name the pass stage that produced it on failure.
pub fn validate_glsl_with_context(
    source: &str,
    stage: ShaderStage,
    context: &str,
) -> Result<naga::Module> {
    validate_glsl(source, stage).with_context(|| format!("{context} generated invalid GLSL"))
}

/// Rewrites every `layout(binding = N) uniform sampler2D name;` line into a
/// `texture2D` in set 1 and a `sampler` in set 2, both at binding N, and
/// redefines `name` as their combination. The uniform block keeps set 0.
fn split_combined_samplers(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        match combined_sampler(line) {
            Some((binding, name)) => {
                out.push_str(&format!(
                    "layout(set = 1, binding = {binding}) uniform texture2D {name}__texture;\n\
                     layout(set = 2, binding = {binding}) uniform sampler {name}__sampler;\n\
                     #define {name} sampler2D({name}__texture, {name}__sampler)\n"
                ));
            }
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

fn combined_sampler(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim().strip_prefix("layout(binding = ")?;
    let (binding, rest) = rest.split_once(") uniform sampler2D ")?;
    let name = rest.strip_suffix(';')?.trim();
    Some((binding.trim(), name))
}

fn numbered_source(source: &str) -> String {
    let mut output = String::from("\nGenerated GLSL:\n---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_fragment_glsl() {
        let source = r#"#version 450
layout(location = 0) out vec4 _return;
void main()
{
    _return = vec4(1.0, 0.0, 0.0, 1.0);
}
"#;
        assert!(validate_glsl(source, ShaderStage::Fragment).is_ok());
    }

    #[test]
    fn test_invalid_glsl_syntax() {
        let source = "#version 450\nvoid main() { vec4 x = ; }\n";
        assert!(validate_glsl(source, ShaderStage::Fragment).is_err());
    }

    #[test]
    fn test_combined_sampler_is_split() {
        let source = "layout(binding = 3) uniform sampler2D Scene;\nfloat x;\n";
        let split = split_combined_samplers(source);
        assert!(split.contains("layout(set = 1, binding = 3) uniform texture2D Scene__texture;\n"));
        assert!(split.contains("layout(set = 2, binding = 3) uniform sampler Scene__sampler;\n"));
        assert!(split.contains("#define Scene sampler2D(Scene__texture, Scene__sampler)\n"));
        assert!(split.ends_with("float x;\n"));
        assert_eq!(combined_sampler("uniform sampler2D Scene;"), None);
    }

    #[test]
    fn test_sampling_a_combined_sampler_validates() {
        let source = r#"#version 450
layout(std140, binding = 0) uniform _GLOBAL_
{
float Strength;
};
layout(binding = 0) uniform sampler2D Scene;
layout(location = 1) in vec2 uv;
layout(location = 0) out vec4 _return;
void main()
{
    _return = texture(Scene, uv) * Strength + textureLod(Scene, uv, 0.0);
}
"#;
        validate_glsl(source, ShaderStage::Fragment).unwrap();
    }

    #[test]
    fn test_validate_with_context() {
        let result = validate_glsl_with_context("not glsl", ShaderStage::Vertex, "pass Blur");
        let err_msg = format!("{:#}", result.unwrap_err());
        assert!(err_msg.contains("pass Blur"));
        assert!(err_msg.contains("   1 | not glsl"));
    }
}
