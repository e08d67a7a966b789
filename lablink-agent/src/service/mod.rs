//! Service layer
//!
//! Services contain the work the poll loop delegates: running a downloaded
//! program, watching the buttons while it runs, and installing runtime
//! updates.
//!
//! Program execution is trait-based to enable testing and dependency
//! injection.

pub mod abort;
mod execution;
pub mod update;

// Re-export traits
pub use execution::ExecutionService;

// Re-export implementations
pub use abort::{AbortGuard, AbortMonitor};
pub use execution::StandardExecutionService;
pub use update::UpdateInstaller;
