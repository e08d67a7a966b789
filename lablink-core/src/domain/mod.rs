//! Core domain types
//!
//! This module contains the structures shared between the transport
//! (which serializes them onto the wire) and the agent (which drives the
//! session and runs programs).

pub mod execution;
pub mod identity;
pub mod log;
pub mod reply;
pub mod session;
pub mod token;
