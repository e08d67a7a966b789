//! Capability modules for downloaded programs
//!
//! Each module is a thin adapter from Lua calls to a Rust seam:
//! - `brick`: the hardware facade ([`Hal`](lablink_core::hal::Hal))
//! - `log`: a [`LogSink`] chosen by the embedding process

pub mod brick;
pub mod log;

pub use brick::BrickModule;
pub use log::{LogModule, LogSink};
