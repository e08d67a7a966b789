//! Runtime update installation
//!
//! The update payload is a zip bundle of the agent runtime. It is unpacked
//! into a staging directory next to the installed runtime and only swapped
//! in once it unpacked cleanly and carries an entry point. The previous
//! runtime is removed afterwards so files never accumulate across updates.
//!
//! ```text
//! <install_dir>/
//!     runtime/            installed runtime
//!         lablink-agent   entry point the agent restarts into
//!     runtime.new/        staging, only during an install
//!     runtime.old/        previous runtime, only during the swap
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory holding the installed runtime
pub const RUNTIME_DIR: &str = "runtime";

/// Executable inside the runtime the agent restarts into
pub const ENTRY_POINT: &str = "lablink-agent";

#[derive(Debug, Clone)]
pub struct UpdateInstaller {
    install_dir: PathBuf,
}

impl UpdateInstaller {
    pub fn new(install_dir: PathBuf) -> Self {
        Self { install_dir }
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.install_dir.join(RUNTIME_DIR)
    }

    /// Executable of the installed runtime
    pub fn entry_point(&self) -> PathBuf {
        self.runtime_dir().join(ENTRY_POINT)
    }

    /// Executable to restart into: the installed runtime when there is one,
    /// `fallback` otherwise
    pub fn launch_target(&self, fallback: PathBuf) -> PathBuf {
        let entry = self.entry_point();
        if entry.is_file() { entry } else { fallback }
    }

    /// Unpacks `payload` and makes it the installed runtime
    ///
    /// Returns the entry point of the new runtime. On error the previously
    /// installed runtime is left in place.
    pub fn install(&self, payload: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.install_dir).with_context(|| {
            format!("Failed to create install dir {}", self.install_dir.display())
        })?;

        let staging = self.install_dir.join(format!("{}.new", RUNTIME_DIR));
        remove_dir(&staging)?;

        if let Err(e) = unpack(payload, &staging) {
            let _ = remove_dir(&staging);
            return Err(e);
        }

        self.swap(&staging)?;

        let entry = self.entry_point();
        info!("runtime updated: {} ({} bytes)", entry.display(), payload.len());
        Ok(entry)
    }

    /// Replaces the installed runtime with `staging`
    fn swap(&self, staging: &Path) -> Result<()> {
        let target = self.runtime_dir();
        let backup = self.install_dir.join(format!("{}.old", RUNTIME_DIR));
        remove_dir(&backup)?;

        let had_runtime = target.exists();
        if had_runtime {
            fs::rename(&target, &backup)
                .with_context(|| format!("Failed to move aside {}", target.display()))?;
        }

        if let Err(e) = fs::rename(staging, &target) {
            if had_runtime {
                let _ = fs::rename(&backup, &target);
            }
            let _ = remove_dir(staging);
            return Err(e).with_context(|| format!("Failed to install into {}", target.display()));
        }

        if let Err(e) = remove_dir(&backup) {
            warn!("failed to remove previous runtime: {:#}", e);
        }
        Ok(())
    }
}

fn unpack(payload: &[u8], dir: &Path) -> Result<()> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(payload)).context("Update is not a zip archive")?;
    debug!("unpacking {} entries into {}", archive.len(), dir.display());
    archive
        .extract(dir)
        .with_context(|| format!("Failed to unpack update into {}", dir.display()))?;

    let entry = dir.join(ENTRY_POINT);
    if !entry.is_file() {
        anyhow::bail!("update has no {} entry point", ENTRY_POINT);
    }
    make_executable(&entry)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
