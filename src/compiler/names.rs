//! Identifier mangling and builtin semantic mapping.

use crate::ast::{BaseClass, Type};

use super::ShaderStage;

/// Identifiers that would collide with GLSL keywords, builtin functions or
/// helpers emitted by the prelude.
const RESERVED_IDENTIFIERS: &[&str] = &[
    "common",
    "partition",
    "input",
    "output",
    "active",
    "filter",
    "superp",
    "invariant",
    "lowp",
    "mediump",
    "highp",
    "precision",
    "patch",
    "subroutine",
    "flat",
    "smooth",
    "noperspective",
    "centroid",
    "layout",
    "attribute",
    "varying",
    "buffer",
    "shared",
    "coherent",
    "restrict",
    "readonly",
    "writeonly",
    "sample",
    "resource",
    "vec2",
    "vec3",
    "vec4",
    "ivec2",
    "ivec3",
    "ivec4",
    "uvec2",
    "uvec3",
    "uvec4",
    "bvec2",
    "bvec3",
    "bvec4",
    "mat2",
    "mat3",
    "mat4",
    "sampler2D",
    "abs",
    "sign",
    "all",
    "any",
    "sin",
    "sinh",
    "cos",
    "cosh",
    "tan",
    "tanh",
    "asin",
    "acos",
    "atan",
    "exp",
    "exp2",
    "log",
    "log2",
    "sqrt",
    "inversesqrt",
    "ceil",
    "floor",
    "fract",
    "trunc",
    "round",
    "radians",
    "degrees",
    "length",
    "normalize",
    "transpose",
    "determinant",
    "intBitsToFloat",
    "uintBitsToFloat",
    "floatBitsToInt",
    "floatBitsToUint",
    "matrixCompMult",
    "not",
    "lessThan",
    "greaterThan",
    "lessThanEqual",
    "greaterThanEqual",
    "equal",
    "notEqual",
    "dot",
    "cross",
    "distance",
    "pow",
    "modf",
    "frexp",
    "ldexp",
    "min",
    "max",
    "step",
    "reflect",
    "texture",
    "textureOffset",
    "textureGather",
    "textureGatherOffset",
    "textureGrad",
    "textureProj",
    "textureSize",
    "fma",
    "mix",
    "clamp",
    "smoothstep",
    "refract",
    "faceforward",
    "textureLod",
    "textureLodOffset",
    "texelFetch",
    "dFdx",
    "dFdy",
    "fwidth",
    "main",
    "_fmod",
    "_sincos",
    "_textureLod",
    "_textureLodOffset",
    "_texelFetch",
    "_GLOBAL_",
];

/// Turns an effect-language identifier into one that is legal and unique in
/// GLSL.
///
/// The namespace is joined with `_NS` separators, reserved names and anything
/// starting with `gl_` get a trailing underscore, and double underscores (which
/// GLSL reserves) become `_US`.
pub fn fix_name(name: &str, namespace: &str) -> String {
    let mut out = namespace.replace("::", "_NS");
    if name.starts_with("gl_") || RESERVED_IDENTIFIERS.contains(&name) {
        out.push('_');
    }
    out.push_str(&name.replace("__", "_US"));
    out
}

/// A GLSL builtin variable standing in for a semantic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    pub ty: Type,
}

/// Maps a system-value semantic to the builtin it denotes in `stage`.
pub fn builtin_for_semantic(semantic: &str, stage: ShaderStage) -> Option<Builtin> {
    let semantic = semantic.to_ascii_uppercase();
    let (name, ty) = match (semantic.as_str(), stage) {
        ("SV_VERTEXID" | "VERTEXID", ShaderStage::Vertex) => {
            ("gl_VertexID", Type::scalar(BaseClass::Int))
        }
        ("SV_INSTANCEID", ShaderStage::Vertex) => ("gl_InstanceID", Type::scalar(BaseClass::Int)),
        ("SV_POSITION" | "POSITION", ShaderStage::Vertex) => {
            ("gl_Position", Type::vector(BaseClass::Float, 4))
        }
        ("SV_POSITION" | "POSITION" | "VPOS", ShaderStage::Fragment) => {
            ("gl_FragCoord", Type::vector(BaseClass::Float, 4))
        }
        ("SV_DEPTH" | "DEPTH", ShaderStage::Fragment) => {
            ("gl_FragDepth", Type::scalar(BaseClass::Float))
        }
        _ => return None,
    };
    Some(Builtin { name, ty })
}

/// Like [`fix_name`], but resolves builtin semantics to the GLSL builtin.
pub fn fix_name_with_semantic(name: &str, semantic: &str, stage: ShaderStage) -> String {
    match builtin_for_semantic(semantic, stage) {
        Some(builtin) => builtin.name.to_string(),
        None => fix_name(name, ""),
    }
}

/// Interface slot a varying semantic binds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SemanticSlot {
    pub location: u32,
    /// Color semantics always travel as `vec4`.
    pub force_vec4: bool,
}

fn semantic_index(semantic: &str, prefix: &str) -> Option<u32> {
    let digits = semantic.strip_prefix(prefix)?;
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

/// Location of a user varying: `COLORn` → n, `TEXCOORDn` → n + 1,
/// `SV_TARGETn` → n.
pub fn semantic_slot(semantic: &str) -> Option<SemanticSlot> {
    let semantic = semantic.to_ascii_uppercase();
    if let Some(n) = semantic_index(&semantic, "SV_TARGET") {
        return Some(SemanticSlot {
            location: n,
            force_vec4: true,
        });
    }
    if let Some(n) = semantic_index(&semantic, "COLOR") {
        return Some(SemanticSlot {
            location: n,
            force_vec4: true,
        });
    }
    if let Some(n) = semantic_index(&semantic, "TEXCOORD") {
        return Some(SemanticSlot {
            location: n + 1,
            force_vec4: false,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names_get_suffix() {
        assert_eq!(fix_name("texture", ""), "texture_");
        assert_eq!(fix_name("main", ""), "main_");
        assert_eq!(fix_name("gl_Color", ""), "gl_Color_");
        assert_eq!(fix_name("color", ""), "color");
    }

    #[test]
    fn test_namespace_and_double_underscore() {
        assert_eq!(fix_name("blur", "fx::pp::"), "fx_NSpp_NSblur");
        assert_eq!(fix_name("a__b", ""), "a_USb");
    }

    #[test]
    fn test_builtin_semantics_depend_on_stage() {
        assert_eq!(
            fix_name_with_semantic("pos", "SV_Position", ShaderStage::Vertex),
            "gl_Position"
        );
        assert_eq!(
            fix_name_with_semantic("pos", "SV_Position", ShaderStage::Fragment),
            "gl_FragCoord"
        );
        assert_eq!(
            fix_name_with_semantic("id", "SV_VertexID", ShaderStage::Vertex),
            "gl_VertexID"
        );
        assert_eq!(
            fix_name_with_semantic("depth", "DEPTH", ShaderStage::Vertex),
            "depth"
        );
    }

    #[test]
    fn test_semantic_slots() {
        assert_eq!(
            semantic_slot("TEXCOORD2"),
            Some(SemanticSlot {
                location: 3,
                force_vec4: false
            })
        );
        assert_eq!(
            semantic_slot("SV_Target1"),
            Some(SemanticSlot {
                location: 1,
                force_vec4: true
            })
        );
        assert_eq!(semantic_slot("COLOR").map(|s| s.location), Some(0));
        assert_eq!(semantic_slot("TEXCOORD").map(|s| s.location), Some(1));
        assert_eq!(semantic_slot("NORMAL"), None);
    }
}
