//! Abort monitor
//!
//! Watches the brick buttons while a program runs:
//! - `enter` + `down` together cancel the program (soft abort)
//! - `back` held for more than [`HARD_ABORT_TICKS`] ticks terminates the agent (hard abort)

use lablink_core::hal::{Hal, Key};
use lablink_lua::AbortSignal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Polling period of the monitor
pub const TICK: Duration = Duration::from_millis(100);

/// Ticks `back` must stay pressed before a hard abort
pub const HARD_ABORT_TICKS: u32 = 10;

/// Invoked on a hard abort
pub type HardAbortHandler = Arc<dyn Fn() + Send + Sync>;

/// Gesture recognised by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortGesture {
    Soft,
    Hard,
}

/// Button state machine, advanced once per tick
#[derive(Debug, Default)]
pub struct AbortDetector {
    long_press: u32,
}

impl AbortDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, hal: &dyn Hal) -> Option<AbortGesture> {
        if hal.is_key_pressed(Key::Back) {
            debug!("back: {}", self.long_press);
            if self.long_press > HARD_ABORT_TICKS {
                return Some(AbortGesture::Hard);
            }
            self.long_press += 1;
        } else if hal.is_key_pressed(Key::Enter) && hal.is_key_pressed(Key::Down) {
            return Some(AbortGesture::Soft);
        } else {
            self.long_press = 0;
        }
        None
    }
}

/// Starts one monitoring task per program run
#[derive(Clone)]
pub struct AbortMonitor {
    hal: Arc<dyn Hal>,
    tick: Duration,
    on_hard_abort: HardAbortHandler,
}

impl AbortMonitor {
    /// Creates a monitor whose hard abort exits the process with status 1
    pub fn new(hal: Arc<dyn Hal>) -> Self {
        Self {
            hal,
            tick: TICK,
            on_hard_abort: Arc::new(exit_process),
        }
    }

    pub fn with_hard_abort_handler(mut self, handler: HardAbortHandler) -> Self {
        self.on_hard_abort = handler;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Watches the buttons until the returned guard is dropped
    ///
    /// A soft abort raises `signal` once and ends the watch.
    pub fn start(&self, signal: AbortSignal) -> AbortGuard {
        let hal = self.hal.clone();
        let on_hard_abort = self.on_hard_abort.clone();
        let tick = self.tick;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            let mut detector = AbortDetector::new();
            loop {
                ticker.tick().await;
                match detector.tick(hal.as_ref()) {
                    Some(AbortGesture::Soft) => {
                        info!("--- soft abort ---");
                        signal.raise();
                        break;
                    }
                    Some(AbortGesture::Hard) => {
                        warn!("--- hard abort ---");
                        on_hard_abort();
                        break;
                    }
                    None => {}
                }
            }
        });

        AbortGuard { handle }
    }
}

fn exit_process() {
    std::process::exit(1)
}

/// Stops the monitoring task when dropped
pub struct AbortGuard {
    handle: JoinHandle<()>,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
