//! Lablink Agent
//!
//! Keeps a brick connected to an Open Roberta lab server and runs the
//! programs the server hands out.
//!
//! Architecture:
//! - Configuration: Load settings from environment, flags or defaults
//! - Connector: Session ownership, one poll loop per connect
//! - Scheduler: The poll loop and its reply handling
//! - Services: Program execution, abort monitoring, runtime updates
//! - Status: Fan-out of session transitions to local listeners
//!
//! The agent long-polls the server until an operator claims the brick with
//! its token, then short-polls for commands. Downloaded programs run in a
//! sandboxed Lua state while the buttons are watched for abort gestures.

pub mod config;
pub mod connector;
pub mod device;
pub mod lua;
pub mod scheduler;
pub mod service;
pub mod status;

pub use config::Config;
pub use connector::Connector;
pub use scheduler::LoopExit;
pub use status::{StatusBroadcaster, StatusEvent};
