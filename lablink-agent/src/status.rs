//! Status broadcasting
//!
//! Every session transition is logged and fanned out to local listeners
//! (a menu UI, the binary itself, tests). Listeners that fall behind lose
//! the oldest events; the session never waits for them.

use chrono::{DateTime, Utc};
use lablink_core::domain::session::{SessionState, StatusObserver};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// One status change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub session_id: Uuid,
    pub state: SessionState,
    pub timestamp: DateTime<Utc>,
}

/// Publishes session transitions on a broadcast channel
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Receives every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusObserver for StatusBroadcaster {
    fn status_changed(&self, session_id: Uuid, state: SessionState) {
        info!("status changed: {}", state);
        // No receivers is fine
        let _ = self.tx.send(StatusEvent {
            session_id,
            state,
            timestamp: Utc::now(),
        });
    }
}
