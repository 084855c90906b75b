//! Effect runtime: resource binding, pass assembly and frame execution over
//! an abstract graphics device.
//!
//! This module is organized into several submodules:
//! - `device`: the `GraphicsDevice` capability, handles and state records
//! - `headless`: in-memory device used by the CLI and the tests
//! - `resources`: resource tables and the shared surfaces
//! - `uniform_layout`: uniform block packing
//! - `compile`: drives code generation, binding and assembly for one tree
//! - `binder`: textures, samplers and uniforms
//! - `pipeline`: render targets, programs and fixed-function state per pass
//! - `executor`: the per-frame present sequence
//! - `depth`: depth-source heuristic
//! - `image_flip`: vertical flips for texture uploads and screenshots
//! - `effect_runtime`: the host-facing runtime tying it together

pub mod binder;
pub mod compile;
pub mod depth;
pub mod device;
pub mod effect_runtime;
pub mod executor;
pub mod headless;
pub mod image_flip;
pub mod pipeline;
pub mod resources;
pub mod uniform_layout;

pub use compile::{CompileReport, CompiledEffect, compile_effect};
pub use depth::{DepthSourceKey, DepthSourceTracker, DepthUpdate};
pub use device::GraphicsDevice;
pub use effect_runtime::{AttachmentPoint, EffectRuntime};
pub use executor::FrameStats;
pub use headless::HeadlessDevice;
