pub mod ast;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod runtime;
