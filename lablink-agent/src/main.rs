//! Lablink Agent binary
//!
//! Connects the brick to a lab server and keeps the session running until
//! it ends, the operator presses Ctrl-C, or a runtime update asks for a
//! restart.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lablink_agent::service::UpdateInstaller;
use lablink_agent::{Config, Connector, LoopExit};
use lablink_core::hal::{Hal, SimulatedHal};

#[derive(Parser)]
#[command(name = "lablink-agent")]
#[command(about = "Open Roberta lab connector for robot bricks", long_about = None)]
struct Cli {
    /// Lab server address (scheme optional, https is tried first)
    #[arg(long, env = "LAB_SERVER")]
    server: Option<String>,

    /// Timeout of push requests in seconds
    #[arg(long)]
    push_timeout: Option<u64>,

    /// Timeout of register requests in seconds
    #[arg(long)]
    register_timeout: Option<u64>,

    /// Directory downloaded programs are written to
    #[arg(long)]
    program_dir: Option<PathBuf>,

    /// Directory runtime updates are installed into
    #[arg(long)]
    install_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lablink_agent=info,lablink_client=info,program=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Starting Lablink Agent {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli)?;
    info!(
        "Loaded configuration: server={}, program_dir={}",
        config.server,
        config.program_dir.display()
    );

    // Hand off to an installed runtime update, if any
    let current = std::env::current_exe().context("Failed to locate executable")?;
    let target = UpdateInstaller::new(config.install_dir.clone()).launch_target(current.clone());
    if !same_file(&target, &current) {
        return restart(&target);
    }

    let hal: Arc<dyn Hal> = Arc::new(SimulatedHal::new());
    hal.clear_display();

    let connector = Connector::new(config.clone(), hal);
    let token = connector.connect(&config.server)?;
    info!("Enter token {} in the lab to claim this brick", token);

    let exit = tokio::select! {
        exit = connector.wait() => exit,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, disconnecting");
            connector.disconnect();
            return Ok(());
        }
    };

    match exit {
        Some(LoopExit::RestartRequested(entry)) => restart(&entry),
        Some(LoopExit::Fatal(e)) => {
            error!("Session ended: {}", e);
            Err(e.into())
        }
        Some(other) => {
            info!("Session ended: {:?}", other);
            Ok(())
        }
        None => anyhow::bail!("poll loop terminated unexpectedly"),
    }
}

/// Loads configuration from the environment and applies command-line overrides
fn load_config(cli: Cli) -> Result<Config> {
    let mut config = Config::from_env().context("Failed to load configuration")?;

    if let Some(server) = cli.server {
        config.server = server;
    }
    if let Some(secs) = cli.push_timeout {
        config.push_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.register_timeout {
        config.register_timeout = Duration::from_secs(secs);
    }
    if let Some(dir) = cli.program_dir {
        config.program_dir = dir;
    }
    if let Some(dir) = cli.install_dir {
        config.install_dir = dir;
    }

    config.validate()?;
    Ok(config)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Replaces the running process with `exe`, passing the same arguments
fn restart(exe: &Path) -> Result<()> {
    let args: Vec<_> = std::env::args_os().skip(1).collect();
    info!("Restarting into {}", exe.display());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = std::process::Command::new(exe).args(&args).exec();
        Err(err).with_context(|| format!("Failed to restart into {}", exe.display()))
    }

    #[cfg(not(unix))]
    {
        std::process::Command::new(exe)
            .args(&args)
            .spawn()
            .with_context(|| format!("Failed to restart into {}", exe.display()))?;
        Ok(())
    }
}
