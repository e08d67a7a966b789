//! Lablink Core
//!
//! Core types and abstractions for the lablink brick agent.
//!
//! This crate contains:
//! - Domain types: Identity, session states, server replies, execution results
//! - Hardware facade: the capability set programs and the agent call into
//! - DTOs: wire representations exchanged with the lab server

pub mod domain;
pub mod dto;
pub mod hal;
