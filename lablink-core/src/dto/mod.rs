//! Data Transfer Objects for lab server communication
//!
//! Requests are the serialized [`Identity`](crate::domain::identity::Identity);
//! this module holds what comes back.

use serde::{Deserialize, Serialize};

/// JSON body of a `pushcmd` reply
///
/// Servers may add fields; only `cmd` is interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub cmd: String,
}
