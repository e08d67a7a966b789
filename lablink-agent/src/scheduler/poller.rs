//! Poll loop
//!
//! Drives one session end to end: long-polls `register` until the server
//! acknowledges the brick, then short-polls `push` and acts on every reply.
//! A downloaded program runs in the middle of the loop; no request is sent
//! while it runs.

use lablink_client::{ClientError, ErrorClass, Transport};
use lablink_core::domain::identity::{Identity, PollCommand};
use lablink_core::domain::reply::Reply;
use lablink_core::domain::session::{Session, SessionError, SessionState};
use lablink_core::domain::token::regenerate_token;
use lablink_core::hal::{Hal, Key, Sound};
use lablink_lua::AbortSignal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::device::DeviceProbe;
use crate::service::{AbortMonitor, ExecutionService, UpdateInstaller};

/// How often key release is checked after a program ends
const KEY_RELEASE_POLL: Duration = Duration::from_millis(100);

/// Why a poll loop ended
#[derive(Debug)]
pub enum LoopExit {
    /// A newer session replaced this one, or the agent disconnected
    Superseded,
    /// The server ended the session
    ServerAbort,
    /// A request failed in a way polling again cannot fix
    Fatal(ClientError),
    /// A runtime update was installed; the host should restart into the
    /// given executable
    RestartRequested(PathBuf),
}

/// Collaborators shared by every poll loop of a connector
#[derive(Clone)]
pub struct PollContext {
    pub config: Config,
    pub hal: Arc<dyn Hal>,
    pub probe: DeviceProbe,
    pub executor: Arc<dyn ExecutionService>,
    pub monitor: AbortMonitor,
    pub installer: UpdateInstaller,
    /// Held while a program runs, across sessions
    pub run_slot: Arc<Mutex<()>>,
}

/// Poll loop of a single session
pub struct PollLoop {
    ctx: PollContext,
    transport: Arc<dyn Transport>,
    session: Session,
    identity: Identity,
    registered: bool,
}

impl PollLoop {
    pub fn new(
        ctx: PollContext,
        transport: Arc<dyn Transport>,
        session: Session,
        identity: Identity,
    ) -> Self {
        Self {
            ctx,
            transport,
            session,
            identity,
            registered: false,
        }
    }

    /// Runs until the session ends and reports why
    pub async fn run(mut self) -> LoopExit {
        debug!("poll loop for session {} started", self.session.id());

        let exit = self.poll().await;
        info!("poll loop stopped: {:?}", exit);

        // Stale loops stay silent: their replacement owns the status now.
        if self.session.close() && self.registered {
            self.ctx.hal.play_file(Sound::Descending);
        }

        exit
    }

    async fn poll(&mut self) -> LoopExit {
        loop {
            if !self.session.is_current() {
                return LoopExit::Superseded;
            }

            let timeout = self.prepare_request();

            let reply = match self.transport.push(&self.identity, timeout).await {
                Ok(reply) => reply,
                Err(e) => match self.on_error(e).await {
                    Some(exit) => return exit,
                    None => continue,
                },
            };
            debug!("response: {}", reply);

            if !self.session.is_current() {
                return LoopExit::Superseded;
            }

            match reply {
                Reply::Repeat => {
                    if let Err(exit) = self.mark_registered() {
                        return exit;
                    }
                    self.identity.nepoexitvalue = Some(0);
                }
                Reply::Abort => {
                    if self.registered {
                        return LoopExit::ServerAbort;
                    }
                    info!("token collision, retrying");
                    self.identity.token = regenerate_token(&self.identity.token);
                    time::sleep(self.ctx.config.collision_backoff).await;
                }
                Reply::Download => {
                    if let Some(exit) = self.download_and_run().await {
                        return exit;
                    }
                }
                Reply::Update => {
                    if let Some(exit) = self.update().await {
                        return exit;
                    }
                }
                Reply::Unknown(cmd) => warn!("unhandled command: {}", cmd),
            }
        }
    }

    /// Picks the command and refreshes the volatile identity fields
    fn prepare_request(&mut self) -> Duration {
        let config = &self.ctx.config;
        let timeout = if self.registered {
            self.identity.cmd = PollCommand::Push;
            config.push_timeout
        } else {
            self.identity.cmd = PollCommand::Register;
            config.register_timeout
        };

        self.identity
            .refresh(self.ctx.probe.hostname(), self.ctx.hal.battery_voltage());
        timeout
    }

    /// Decides whether a failed request ends the loop
    async fn on_error(&self, e: ClientError) -> Option<LoopExit> {
        match e.classify() {
            ErrorClass::Retryable => {
                info!("{}: {} (retrying)", self.ctx.config.server, e);
                let delay = self.ctx.config.retry_delay;
                if !delay.is_zero() {
                    time::sleep(delay).await;
                }
                None
            }
            ErrorClass::Fatal => {
                error!("{}: {}", self.ctx.config.server, e);
                Some(LoopExit::Fatal(e))
            }
        }
    }

    /// Moves the session, translating a lost epoch into a loop exit
    fn enter(&self, state: SessionState) -> Result<(), LoopExit> {
        match self.session.transition(state) {
            Ok(()) => Ok(()),
            Err(SessionError::Superseded(_)) => Err(LoopExit::Superseded),
            Err(e @ SessionError::InvalidTransition { .. }) => {
                warn!("{}", e);
                Ok(())
            }
        }
    }

    fn mark_registered(&mut self) -> Result<(), LoopExit> {
        if !self.registered {
            self.enter(SessionState::Registered)?;
            self.ctx.hal.play_file(Sound::Ascending);
            self.registered = true;
        }
        Ok(())
    }

    async fn download_and_run(&mut self) -> Option<LoopExit> {
        // Being handed work is as good an acknowledgement as a repeat.
        if let Err(exit) = self.mark_registered() {
            return Some(exit);
        }

        let timeout = self.ctx.config.push_timeout;
        debug!("download code: {}/download", self.ctx.config.server);
        let program = match self.transport.download(&self.identity, timeout).await {
            Ok(program) => program,
            Err(e) => return self.on_error(e).await,
        };

        // Executing covers the run only, not the fetch.
        if let Err(exit) = self.enter(SessionState::Executing) {
            return Some(exit);
        }

        let hal = self.ctx.hal.clone();
        let result = {
            let _slot = self.ctx.run_slot.lock().await;
            hal.clear_display();

            let signal = AbortSignal::new();
            let _guard = self.ctx.monitor.start(signal.clone());
            self.ctx.executor.execute(program, signal).await
        };
        info!("program finished: {}", result);
        self.identity.nepoexitvalue = Some(result.exit_value());

        // If the program waited for a key press, wait for the key to be
        // released before handing the buttons back.
        while hal.is_key_pressed(Key::Any) {
            time::sleep(KEY_RELEASE_POLL).await;
        }
        hal.reset_state();

        self.enter(SessionState::Registered).err()
    }

    async fn update(&mut self) -> Option<LoopExit> {
        let command = self.ctx.config.update_command();
        info!("download update: {}/{}", self.ctx.config.server, command);

        let payload = match self.transport.fetch_update(self.ctx.config.push_timeout).await {
            Ok(payload) => payload,
            Err(e) => return self.on_error(e).await,
        };

        match self.ctx.installer.install(&payload) {
            Ok(entry) => Some(LoopExit::RestartRequested(entry)),
            Err(e) => {
                error!("failed to install update: {:#}", e);
                None
            }
        }
    }
}
