// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Callout configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlugwerkError, Result};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/plugwerk/config.json";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV: &str = "PLUGWERK_CONFIG";

/// What to do with matching queues when their device goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoveAction {
    /// Pause the queue with the sentinel state message.
    Disable,
    /// Delete the queue outright.
    Delete,
}

/// Settings for one hotplug invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotplugConfig {
    /// Print server host (CUPS scheduler).
    pub server_host: String,
    /// Print server port (default 631).
    pub server_port: u16,
    /// Persistent devpath -> device-URI map.
    pub uri_map_path: PathBuf,
    /// Mount point of sysfs.
    pub sysfs_root: PathBuf,
    /// State message marking a queue as disabled by us rather than by an
    /// administrator.
    pub disabled_reason: String,
    /// Device-URI schemes in decreasing order of preference.
    pub preferred_schemes: Vec<String>,
    /// Schemes that never name a directly attached device.
    pub excluded_schemes: Vec<String>,
    /// Program that creates a new queue: `helper DEVICE_ID URI...`.
    pub add_printer_helper: PathBuf,
    /// CUPS bluetooth backend used to fetch a Device ID by address.
    pub bluetooth_helper: PathBuf,
    /// Connection attempts after the first one fails.
    pub connect_retries: u32,
    /// Fixed delay between connection attempts, in seconds.
    pub connect_backoff_secs: u64,
    /// Pause before asking the server for devices, in milliseconds.
    pub settle_delay_ms: u64,
    /// Timeout for the USB GET_DEVICE_ID control transfer, in seconds.
    pub usb_timeout_secs: u64,
    /// Handling of matching queues on remove.
    pub remove_action: RemoveAction,
    /// Upper bound on waiting for queue-creation helpers before exit.
    pub helper_wait_secs: u64,
}

impl Default for HotplugConfig {
    fn default() -> Self {
        Self {
            server_host: "localhost".into(),
            server_port: 631,
            uri_map_path: PathBuf::from("/var/run/udev-configure-printer/usb-uris"),
            sysfs_root: PathBuf::from("/sys"),
            disabled_reason: "Unplugged or turned off".into(),
            preferred_schemes: vec!["hp".into(), "usb".into()],
            excluded_schemes: [
                "beh",
                "bluetooth",
                "cups-pdf",
                "dnssd",
                "http",
                "https",
                "ipp",
                "lpd",
                "ncp",
                "parallel",
                "scsi",
                "smb",
                "snmp",
                "socket",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            add_printer_helper: PathBuf::from("/usr/libexec/udev-add-printer"),
            bluetooth_helper: PathBuf::from("/usr/lib/cups/backend/bluetooth"),
            connect_retries: 5,
            connect_backoff_secs: 2,
            settle_delay_ms: 1000,
            usb_timeout_secs: 5,
            remove_action: RemoveAction::Disable,
            helper_wait_secs: 30,
        }
    }
}

impl HotplugConfig {
    /// Load configuration.
    ///
    /// An explicit path (flag or `PLUGWERK_CONFIG`) must exist and parse.
    /// The default path is optional: if it is absent the built-in defaults
    /// are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    debug!("no configuration file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a JSON configuration file.  Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| PlugwerkError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| PlugwerkError::Config(format!("parse {}: {e}", path.display())))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Base URL of the print server, e.g. `ipp://localhost:631`.
    pub fn server_url(&self) -> String {
        format!("ipp://{}:{}", self.server_host, self.server_port)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_secs(self.connect_backoff_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn usb_timeout(&self) -> Duration {
        Duration::from_secs(self.usb_timeout_secs)
    }

    pub fn helper_wait(&self) -> Duration {
        Duration::from_secs(self.helper_wait_secs)
    }
}
