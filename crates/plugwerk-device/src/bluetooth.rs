// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bluetooth printers have no sysfs printer node to read a Device ID from;
// the CUPS bluetooth backend can query one given the device address.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument};

use plugwerk_core::error::{PlugwerkError, Result};

/// True for `XX:XX:XX:XX:XX:XX` with hexadecimal octets.
pub fn is_bluetooth_address(s: &str) -> bool {
    let octets: Vec<&str> = s.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Runs `<program> --get-deviceid <address>` and returns its stdout.
pub struct BluetoothHelper {
    program: PathBuf,
    timeout: Duration,
}

impl BluetoothHelper {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    #[instrument(skip(self), fields(program = %self.program.display()))]
    pub async fn fetch_device_id(&self, address: &str) -> Result<Vec<u8>> {
        if !is_bluetooth_address(address) {
            return Err(PlugwerkError::Bluetooth(format!("not a Bluetooth address: {address}")));
        }

        let output = Command::new(&self.program)
            .arg("--get-deviceid")
            .arg(address)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| {
                PlugwerkError::Bluetooth(format!("timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| PlugwerkError::Bluetooth(format!("spawn: {e}")))?;

        if !output.status.success() {
            return Err(PlugwerkError::Bluetooth(format!("helper exited with {}", output.status)));
        }

        debug!(len = output.stdout.len(), "Bluetooth Device ID received");
        Ok(output.stdout)
    }
}
