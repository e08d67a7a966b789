//! Concrete LogSink for the agent
//!
//! Program output goes to the agent's own log under the `program` target,
//! so it can be filtered separately with `RUST_LOG=program=debug`.

use lablink_core::domain::log::LogLevel;
use lablink_lua::LogSink;
use tracing::{debug, error, info, warn};

/// Log sink that forwards program messages to `tracing`
#[derive(Debug, Default)]
pub struct TracingLogSink;

impl TracingLogSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for TracingLogSink {
    fn write(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!(target: "program", "{}", message),
            LogLevel::Info => info!(target: "program", "{}", message),
            LogLevel::Warning => warn!(target: "program", "{}", message),
            LogLevel::Error => error!(target: "program", "{}", message),
        }
    }
}
