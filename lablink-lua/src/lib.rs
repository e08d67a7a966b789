//! Lablink Lua Runtime
//!
//! Capability-limited Lua environment for programs downloaded from the lab
//! server. It includes:
//! - Module trait and registry for Lua modules
//! - A restricted sandbox without I/O or dynamic loading
//! - The `brick` and `log` capability modules
//! - The abort signal shared between a running program and its monitor
//! - Source normalization applied before a program is compiled

pub mod module;
pub mod modules;
pub mod normalize;
pub mod sandbox;
pub mod signal;

pub use module::{LabModule, ModuleRegistry};
pub use modules::{BrickModule, LogModule, LogSink};
pub use normalize::{Normalizer, SourceNormalizer};
pub use sandbox::create_sandbox;
pub use signal::{AbortSignal, CANCELLED};
