//! Logging module for downloaded programs
//!
//! Programs call `log.info("...")` and friends; the embedding process decides
//! where the lines go by providing a [`LogSink`].

use crate::module::LabModule;
use lablink_core::domain::log::LogLevel;
use mlua::prelude::*;
use std::sync::{Arc, Mutex};

/// Trait for log sinks
///
/// # Thread Safety
/// Implementations must be Send to work with Lua's threading model.
pub trait LogSink: Send + Sync {
    /// Write a log message
    fn write(&mut self, level: LogLevel, message: &str);
}

/// Logging module, generic over the sink it forwards to
pub struct LogModule<S: LogSink> {
    sink: Arc<Mutex<S>>,
}

impl<S: LogSink> LogModule<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }
}

impl<S: LogSink + 'static> LabModule for LogModule<S> {
    fn id(&self) -> &'static str {
        "log"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let log_table = lua.create_table()?;

        for (name, level) in [
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warning", LogLevel::Warning),
            ("error", LogLevel::Error),
        ] {
            let sink = self.sink.clone();
            log_table.set(
                name,
                lua.create_function(move |_, msg: String| {
                    sink.lock()
                        .map_err(|e| LuaError::RuntimeError(format!("Failed to lock sink: {}", e)))?
                        .write(level, &msg);
                    Ok(())
                })?,
            )?;
        }

        lua.globals().set(self.id(), log_table)?;
        Ok(())
    }
}
