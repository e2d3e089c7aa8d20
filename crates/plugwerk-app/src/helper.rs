// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Queue-creation helper processes.
//
// When no existing queue serves a device, an external program creates one:
//
//     <add_printer_helper> <full Device ID> <uri1> <uri2>...
//
// Its output is not consumed.  Helpers are launched without waiting; before
// the callout exits it reaps them for a bounded time so they are not left as
// zombies, and anything still running after that is left to finish alone.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use plugwerk_core::error::{PlugwerkError, Result};

struct Launched {
    program: PathBuf,
    child: Child,
}

/// Tracks launched helpers until they are reaped.
#[derive(Default)]
pub struct HelperTracker {
    running: Vec<Launched>,
}

impl HelperTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `program` with the Device ID and URIs as arguments.
    pub fn spawn(&mut self, program: &Path, device_id: &str, uris: &[String]) -> Result<()> {
        let child = Command::new(program)
            .arg(device_id)
            .args(uris)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlugwerkError::Helper(format!("{}: {e}", program.display())))?;

        info!(
            program = %program.display(),
            pid = child.id(),
            uris = uris.len(),
            "queue creation helper started"
        );
        self.running.push(Launched {
            program: program.to_path_buf(),
            child,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Wait up to `limit` in total for every helper and log how each ended.
    /// Returns how many were reaped.
    pub async fn wait_all(self, limit: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + limit;
        let mut reaped = 0;

        for Launched { program, mut child } in self.running {
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) if status.success() => {
                    debug!(program = %program.display(), "queue creation helper finished");
                    reaped += 1;
                }
                Ok(Ok(status)) => {
                    warn!(program = %program.display(), %status, "queue creation helper failed");
                    reaped += 1;
                }
                Ok(Err(e)) => {
                    warn!(program = %program.display(), error = %e, "cannot wait for helper")
                }
                Err(_) => warn!(
                    program = %program.display(),
                    pid = child.id(),
                    "queue creation helper still running, leaving it detached"
                ),
            }
        }
        reaped
    }
}
