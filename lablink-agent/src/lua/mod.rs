//! Lua execution infrastructure for the agent
//!
//! This module provides:
//! - The executor that runs one downloaded program in a sandbox
//! - The log sink routing program output to `tracing`

pub mod executor;
pub mod sinks;

pub use executor::LuaExecutor;
