//! Effect node tree → GLSL 4.50 code generation.
//!
//! This module is organized into several submodules:
//! - `names`: identifier mangling and builtin semantic mapping
//! - `types`: type names and implicit-cast lowering
//! - `expr`: expression lowering rules
//! - `intrinsics`: intrinsic call lowering
//! - `stmt`: statement lowering
//! - `codegen`: global declarations, per-function buffers, dependency order
//! - `entry_point`: per-stage source synthesis (prelude, interface, `main`)
//! - `validation`: GLSL validation using naga
//!
//! The main entry point is `CodeGenerator`: feed it the tree's declarations,
//! then ask it for a stage source per entry function.

pub mod codegen;
pub mod entry_point;
pub mod expr;
pub mod intrinsics;
pub mod names;
pub mod stmt;
pub mod types;
pub mod validation;

pub use codegen::{CodeGenerator, FunctionSource};
pub use expr::LoweringContext;
pub use validation::{validate_glsl, validate_glsl_with_context};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Short tag used in generated file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs",
            ShaderStage::Fragment => "fs",
        }
    }
}
