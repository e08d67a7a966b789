//! Connector
//!
//! Owns the session of the agent. `connect` starts a new session with a
//! fresh token and its own poll loop; any earlier loop is superseded and
//! winds down on its own without touching the status again.

use anyhow::{Context, Result};
use lablink_client::{FallbackPolicy, LabClient, Transport};
use lablink_core::domain::identity::Identity;
use lablink_core::domain::session::{SessionState, SessionTracker};
use lablink_core::hal::Hal;
use lablink_lua::{Normalizer, SourceNormalizer};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::device::DeviceProbe;
use crate::scheduler::{LoopExit, PollContext, PollLoop};
use crate::service::{AbortMonitor, ExecutionService, StandardExecutionService, UpdateInstaller};
use crate::status::{StatusBroadcaster, StatusEvent};

/// Version reported as `menuversion`
pub const MENU_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Connector {
    ctx: PollContext,
    tracker: SessionTracker,
    status: StatusBroadcaster,
    current: Mutex<Option<JoinHandle<LoopExit>>>,
}

impl Connector {
    /// Creates a connector with the standard services
    pub fn new(config: Config, hal: Arc<dyn Hal>) -> Self {
        let normalizer: Arc<dyn Normalizer> = Arc::new(SourceNormalizer::new());
        let executor = Arc::new(
            StandardExecutionService::new(config.program_dir.clone(), normalizer, hal.clone())
                .with_memory_limit(config.memory_limit),
        );
        let monitor = AbortMonitor::new(hal.clone());
        Self::with_services(config, hal, executor, monitor)
    }

    pub fn with_services(
        config: Config,
        hal: Arc<dyn Hal>,
        executor: Arc<dyn ExecutionService>,
        monitor: AbortMonitor,
    ) -> Self {
        let status = StatusBroadcaster::new();
        let ctx = PollContext {
            installer: UpdateInstaller::new(config.install_dir.clone()),
            probe: DeviceProbe::new(),
            run_slot: Arc::new(tokio::sync::Mutex::new(())),
            config,
            hal,
            executor,
            monitor,
        };

        Self {
            ctx,
            tracker: SessionTracker::new(Arc::new(status.clone())),
            status,
            current: Mutex::new(None),
        }
    }

    /// Replaces the device probe
    pub fn with_probe(mut self, probe: DeviceProbe) -> Self {
        self.ctx.probe = probe;
        self
    }

    /// Connects to `address` over HTTP
    ///
    /// Returns the token the operator enters in the lab to claim the brick.
    pub fn connect(&self, address: &str) -> Result<String> {
        let policy = FallbackPolicy {
            alternate_prefix: self.ctx.config.rest_prefix.clone(),
            ..FallbackPolicy::default()
        };
        let client = LabClient::new(address)
            .with_context(|| format!("Failed to create client for {}", address))?
            .with_policy(policy)
            .with_update_command(self.ctx.config.update_command());

        Ok(self.connect_with(Arc::new(client)))
    }

    /// Starts a new session talking through `transport`
    ///
    /// Must be called within a tokio runtime.
    pub fn connect_with(&self, transport: Arc<dyn Transport>) -> String {
        let mut identity = Identity::new(self.ctx.config.firmware_name.clone(), MENU_VERSION);
        self.ctx.probe.describe(&mut identity);
        let token = identity.token.clone();

        let session = self.tracker.begin();
        info!("session {} started, token {}", session.id(), token);

        let poll = PollLoop::new(self.ctx.clone(), transport, session, identity);
        let handle = tokio::spawn(poll.run());

        if self.lock_current().replace(handle).is_some() {
            debug!("previous poll loop detached");
        }

        token
    }

    /// Ends the current session
    ///
    /// The poll loop notices at its next check, which may be after its
    /// pending request times out.
    pub fn disconnect(&self) {
        debug!("disconnect()");
        self.tracker.end();
    }

    pub fn status(&self) -> SessionState {
        self.tracker.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Waits for the current poll loop to end
    ///
    /// Returns `None` when no loop is running or the loop panicked.
    pub async fn wait(&self) -> Option<LoopExit> {
        let handle = self.lock_current().take()?;
        match handle.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!("poll loop task failed: {}", e);
                None
            }
        }
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<LoopExit>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
