//! Session state machine
//!
//! A session walks through four states:
//!
//! ```text
//! +-> Disconnected
//! |       |
//! |       v
//! +-- Connected
//! |       |
//! |       v
//! +-- Registered <--+
//! |       |         |
//! |       v         |
//! +-- Executing ----+
//! ```
//!
//! Every `connect` starts a new epoch. Handles from older epochs are
//! superseded: they can no longer change the state or emit notifications,
//! so a poll loop that is still waiting on a request timeout cannot clobber
//! the status of its replacement.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Connection state of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connected,
    Registered,
    Executing,
}

impl SessionState {
    /// Whether the machine may move from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connected)
                | (Connected, Registered)
                | (Registered, Executing)
                | (Executing, Registered)
                | (Connected, Disconnected)
                | (Registered, Disconnected)
                | (Executing, Disconnected)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Registered => write!(f, "registered"),
            SessionState::Executing => write!(f, "executing"),
        }
    }
}

/// Errors raised by session transitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("session {0} has been superseded")]
    Superseded(Uuid),
}

/// Receives a notification on every state change
///
/// Observers must not call back into the session.
pub trait StatusObserver: Send + Sync {
    fn status_changed(&self, session_id: Uuid, state: SessionState);
}

struct Inner {
    epoch: u64,
    session_id: Uuid,
    state: SessionState,
}

/// Owner of the session state
///
/// Hands out one [`Session`] per connection attempt.
#[derive(Clone)]
pub struct SessionTracker {
    inner: Arc<Mutex<Inner>>,
    observer: Arc<dyn StatusObserver>,
}

impl SessionTracker {
    pub fn new(observer: Arc<dyn StatusObserver>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                epoch: 0,
                session_id: Uuid::nil(),
                state: SessionState::Disconnected,
            })),
            observer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Starts a new epoch in the Connected state
    ///
    /// Any previously issued [`Session`] becomes superseded.
    pub fn begin(&self) -> Session {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.session_id = Uuid::new_v4();
        inner.state = SessionState::Connected;
        self.observer
            .status_changed(inner.session_id, SessionState::Connected);
        debug!("session {} started (epoch {})", inner.session_id, inner.epoch);

        Session {
            tracker: self.clone(),
            epoch: inner.epoch,
            id: inner.session_id,
        }
    }

    /// Ends the current epoch and reports Disconnected
    ///
    /// The running session, if any, becomes superseded and exits quietly.
    pub fn end(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        if inner.state != SessionState::Disconnected {
            inner.state = SessionState::Disconnected;
            self.observer
                .status_changed(inner.session_id, SessionState::Disconnected);
        }
    }
}

/// Handle on one connection attempt
#[derive(Clone)]
pub struct Session {
    tracker: SessionTracker,
    epoch: u64,
    id: Uuid,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether no newer session has replaced this one
    pub fn is_current(&self) -> bool {
        self.tracker.lock().epoch == self.epoch
    }

    /// State as seen by this session
    pub fn state(&self) -> SessionState {
        self.tracker.state()
    }

    /// Moves to `next` and notifies the observer
    ///
    /// Re-entering the current state is accepted and emits nothing.
    pub fn transition(&self, next: SessionState) -> Result<(), SessionError> {
        self.apply(next).map(|_| ())
    }

    /// Reports Disconnected unless the session was superseded
    ///
    /// Returns whether a notification was emitted.
    pub fn close(&self) -> bool {
        matches!(self.apply(SessionState::Disconnected), Ok(true))
    }

    fn apply(&self, next: SessionState) -> Result<bool, SessionError> {
        let mut inner = self.tracker.lock();
        if inner.epoch != self.epoch {
            return Err(SessionError::Superseded(self.id));
        }

        if inner.state == next {
            return Ok(false);
        }

        if !inner.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: inner.state,
                to: next,
            });
        }

        debug!("session {}: {} -> {}", self.id, inner.state, next);
        inner.state = next;
        self.tracker.observer.status_changed(self.id, next);
        Ok(true)
    }
}
