//! Device probing
//!
//! Reads the host facts reported in the identity from procfs and sysfs.
//! All paths are resolved against a root directory so tests can point the
//! probe at a fake tree.

use std::fs;
use std::path::PathBuf;
use tracing::debug;

use lablink_core::domain::identity::Identity;

const INTERFACE_FAMILIES: [&str; 3] = ["wlan", "usb", "eth"];
const INTERFACES_PER_FAMILY: usize = 10;

#[derive(Debug, Clone)]
pub struct DeviceProbe {
    root: PathBuf,
}

impl DeviceProbe {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, path: &str) -> Option<String> {
        let path = self.root.join(path.trim_start_matches('/'));
        fs::read_to_string(&path)
            .map_err(|e| debug!("cannot read {}: {}", path.display(), e))
            .ok()
    }

    pub fn hostname(&self) -> String {
        self.read("/proc/sys/kernel/hostname")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "brick".to_string())
    }

    /// Hardware address of the first interface found, wireless first
    pub fn mac_address(&self) -> Option<String> {
        INTERFACE_FAMILIES
            .iter()
            .flat_map(|family| (0..INTERFACES_PER_FAMILY).map(move |ix| format!("{}{}", family, ix)))
            .find_map(|ifname| self.read(&format!("/sys/class/net/{}/address", ifname)))
            .map(|addr| addr.trim().to_lowercase())
            .filter(|addr| !addr.is_empty())
    }

    pub fn firmware_version(&self) -> String {
        self.read("/proc/version").unwrap_or_default()
    }

    /// Fills the static identity fields
    pub fn describe(&self, identity: &mut Identity) {
        if let Some(mac) = self.mac_address() {
            identity.macaddr = mac;
        }
        identity.firmwareversion = self.firmware_version();
        identity.brickname = self.hostname();
    }
}

impl Default for DeviceProbe {
    fn default() -> Self {
        Self::new()
    }
}
