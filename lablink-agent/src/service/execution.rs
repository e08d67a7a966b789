//! Execution service
//!
//! Handles one downloaded program:
//! - Normalizing the source
//! - Storing it in the program directory (kept afterwards for diagnostics)
//! - Running it on a blocking worker with the Lua executor
//!
//! This service never fails; every problem is folded into the
//! [`ExecutionResult`] reported back to the server.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lablink_client::ProgramDownload;
use lablink_core::domain::execution::ExecutionResult;
use lablink_core::hal::Hal;
use lablink_lua::{AbortSignal, Normalizer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::lua::LuaExecutor;
use crate::lua::executor::DEFAULT_MEMORY_LIMIT;

/// Service trait for running downloaded programs
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Runs `program` to completion or until `signal` is raised
    async fn execute(&self, program: ProgramDownload, signal: AbortSignal) -> ExecutionResult;
}

/// Standard implementation of ExecutionService
pub struct StandardExecutionService {
    program_dir: PathBuf,
    normalizer: Arc<dyn Normalizer>,
    hal: Arc<dyn Hal>,
    memory_limit: usize,
}

impl StandardExecutionService {
    pub fn new(program_dir: PathBuf, normalizer: Arc<dyn Normalizer>, hal: Arc<dyn Hal>) -> Self {
        Self {
            program_dir,
            normalizer,
            hal,
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }

    /// Caps the Lua heap of every run at `bytes`
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Writes the program with owner read/write/execute permission
    fn store(&self, filename: &str, code: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.program_dir).with_context(|| {
            format!("Failed to create program dir {}", self.program_dir.display())
        })?;

        let path = self.program_dir.join(filename);
        fs::write(&path, code)
            .with_context(|| format!("Failed to write program {}", path.display()))?;
        make_runnable(&path)?;

        Ok(path)
    }
}

#[cfg(unix)]
fn make_runnable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn make_runnable(_path: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl ExecutionService for StandardExecutionService {
    async fn execute(&self, program: ProgramDownload, signal: AbortSignal) -> ExecutionResult {
        let code = self.normalizer.normalize(&program.source);

        match self.store(&program.filename, &code) {
            Ok(path) => info!("code downloaded to: {}", path.display()),
            Err(e) => {
                error!("{:#}", e);
                return ExecutionResult::Fault;
            }
        }

        let executor = LuaExecutor::new(self.hal.clone()).with_memory_limit(self.memory_limit);
        let name = program.filename;
        let outcome =
            tokio::task::spawn_blocking(move || executor.run(&name, &code, &signal)).await;

        outcome.unwrap_or_else(|e| {
            error!("execution worker failed: {}", e);
            ExecutionResult::Fault
        })
    }
}
