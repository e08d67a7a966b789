//! Agent configuration
//!
//! Defines all configurable parameters of the agent: the lab server
//! address, request timeouts, where downloaded programs and runtime updates
//! are written, and the fallback prefix for older servers.

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

use crate::lua::executor::DEFAULT_MEMORY_LIMIT;

/// Default lab server
pub const DEFAULT_SERVER: &str = "lab.open-roberta.org";

/// Agent configuration
///
/// Timeouts are configurable to allow tuning for slow networks and for
/// tests against local servers.
#[derive(Debug, Clone)]
pub struct Config {
    /// Lab server address, with or without scheme
    pub server: String,

    /// Timeout of a `push` request once the brick is registered
    pub push_timeout: Duration,

    /// Timeout of a `register` request (server long-poll)
    pub register_timeout: Duration,

    /// Pause before polling again after a retryable failure
    pub retry_delay: Duration,

    /// Pause after a token collision before registering with a new token
    pub collision_backoff: Duration,

    /// Directory downloaded programs are written to
    pub program_dir: PathBuf,

    /// Directory runtime updates are installed into
    pub install_dir: PathBuf,

    /// Reported as `firmwarename`; also selects the update endpoint
    pub firmware_name: String,

    /// Path prefix tried after a 404; `None` disables the fallback
    pub rest_prefix: Option<String>,

    /// Cap on the Lua heap of a running program, in bytes
    pub memory_limit: usize,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(server: String) -> Self {
        Self {
            server,
            push_timeout: Duration::from_secs(15),
            register_timeout: Duration::from_secs(330),
            retry_delay: Duration::ZERO,
            collision_backoff: Duration::from_secs(1),
            program_dir: home_dir(),
            install_dir: home_dir().join(".lablink"),
            firmware_name: "ev3dev".to_string(),
            rest_prefix: Some("rest".to_string()),
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// All variables are optional:
    /// - LAB_SERVER (default: lab.open-roberta.org)
    /// - LAB_PUSH_TIMEOUT (seconds, default: 15)
    /// - LAB_REGISTER_TIMEOUT (seconds, default: 330)
    /// - LAB_RETRY_DELAY_MS (milliseconds, default: 0)
    /// - LAB_PROGRAM_DIR (default: $HOME)
    /// - LAB_INSTALL_DIR (default: $HOME/.lablink)
    /// - LAB_FIRMWARE_NAME (default: ev3dev)
    /// - LAB_REST_PREFIX (default: rest; empty disables the fallback)
    /// - LAB_MEMORY_LIMIT_MB (default: 16)
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new(
            std::env::var("LAB_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string()),
        );

        if let Some(secs) = parse_var::<u64>("LAB_PUSH_TIMEOUT")? {
            config.push_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64>("LAB_REGISTER_TIMEOUT")? {
            config.register_timeout = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_var::<u64>("LAB_RETRY_DELAY_MS")? {
            config.retry_delay = Duration::from_millis(ms);
        }

        if let Ok(dir) = std::env::var("LAB_PROGRAM_DIR") {
            config.program_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("LAB_INSTALL_DIR") {
            config.install_dir = PathBuf::from(dir);
        }

        if let Ok(name) = std::env::var("LAB_FIRMWARE_NAME") {
            config.firmware_name = name;
        }

        if let Ok(prefix) = std::env::var("LAB_REST_PREFIX") {
            config.rest_prefix = Some(prefix).filter(|p| !p.trim().is_empty());
        }

        if let Some(mb) = parse_var::<usize>("LAB_MEMORY_LIMIT_MB")? {
            config.memory_limit = mb.saturating_mul(1024 * 1024);
        }

        Ok(config)
    }

    /// Endpoint the runtime update is fetched from
    pub fn update_command(&self) -> String {
        format!("update/{}/runtime", self.firmware_name)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.trim().is_empty() {
            anyhow::bail!("server cannot be empty");
        }

        if self.push_timeout.is_zero() {
            anyhow::bail!("push_timeout must be greater than 0");
        }

        if self.register_timeout < self.push_timeout {
            anyhow::bail!("register_timeout must not be shorter than push_timeout");
        }

        if self.firmware_name.is_empty() || self.firmware_name.contains('/') {
            anyhow::bail!("firmware_name must be a non-empty path segment");
        }

        if self.program_dir.as_os_str().is_empty() {
            anyhow::bail!("program_dir cannot be empty");
        }

        if self.install_dir.as_os_str().is_empty() {
            anyhow::bail!("install_dir cannot be empty");
        }

        if self.memory_limit == 0 {
            anyhow::bail!("memory_limit must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER.to_string())
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {}: {:?}", name, value)),
        Err(_) => Ok(None),
    }
}
