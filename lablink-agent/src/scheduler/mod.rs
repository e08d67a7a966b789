//! Scheduler layer for the agent
//!
//! This layer drives the conversation with the lab server: one poll loop
//! per session, from registration until the session ends.

pub mod poller;

pub use poller::{LoopExit, PollContext, PollLoop};
