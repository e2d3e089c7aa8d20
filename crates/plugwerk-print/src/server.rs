// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The print-server operations the hotplug flows depend on.

use plugwerk_core::error::Result;
use plugwerk_core::types::{Queue, ServerDevice};

/// Device and queue directory of a print server, plus queue state control.
///
/// [`CupsClient`](crate::cups_client::CupsClient) speaks this over IPP; tests
/// substitute an in-memory server.
#[allow(async_fn_in_trait)]
pub trait PrintServer {
    /// Devices the server's backends can see, minus those whose scheme is in
    /// `exclude_schemes`.
    async fn list_devices(&self, exclude_schemes: &[String]) -> Result<Vec<ServerDevice>>;

    /// All configured queues.  No queues is an empty list, not an error.
    async fn list_queues(&self) -> Result<Vec<Queue>>;

    /// Stop a queue and set its state message.
    async fn pause_queue(&self, printer_uri: &str, message: &str) -> Result<()>;

    async fn resume_queue(&self, printer_uri: &str) -> Result<()>;

    async fn delete_queue(&self, printer_uri: &str) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;

    use plugwerk_core::error::PlugwerkError;
    use plugwerk_core::types::QueueState;

    use super::*;

    /// An action recorded by [`FakeServer`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Action {
        Pause(String, String),
        Resume(String),
        Delete(String),
    }

    /// In-memory print server.
    #[derive(Default)]
    pub struct FakeServer {
        pub devices: Vec<ServerDevice>,
        pub queues: Mutex<Vec<Queue>>,
        pub actions: Mutex<Vec<Action>>,
        pub fail_devices: bool,
        pub device_requests: Mutex<Vec<Vec<String>>>,
    }

    impl FakeServer {
        pub fn with_devices(devices: &[(&str, Option<&str>)]) -> Self {
            Self {
                devices: devices
                    .iter()
                    .map(|(uri, id)| ServerDevice {
                        device_uri: uri.to_string(),
                        device_id: id.map(String::from),
                    })
                    .collect(),
                ..Default::default()
            }
        }

        pub fn add_queue(&self, name: &str, device_uri: &str, state: QueueState, message: &str) {
            self.queues.lock().unwrap().push(Queue {
                printer_uri: format!("ipp://localhost/printers/{name}"),
                device_uri: device_uri.into(),
                state,
                state_message: message.into(),
            });
        }

        pub fn actions(&self) -> Vec<Action> {
            self.actions.lock().unwrap().clone()
        }
    }

    impl PrintServer for FakeServer {
        async fn list_devices(&self, exclude_schemes: &[String]) -> Result<Vec<ServerDevice>> {
            if self.fail_devices {
                return Err(PlugwerkError::PrintServer {
                    operation: "CUPS-Get-Devices",
                    status: 0x0500,
                });
            }
            self.device_requests
                .lock()
                .unwrap()
                .push(exclude_schemes.to_vec());
            Ok(self.devices.clone())
        }

        async fn list_queues(&self) -> Result<Vec<Queue>> {
            Ok(self.queues.lock().unwrap().clone())
        }

        async fn pause_queue(&self, printer_uri: &str, message: &str) -> Result<()> {
            self.actions
                .lock()
                .unwrap()
                .push(Action::Pause(printer_uri.into(), message.into()));
            for q in self.queues.lock().unwrap().iter_mut() {
                if q.printer_uri == printer_uri {
                    q.state = QueueState::Stopped;
                    q.state_message = message.into();
                }
            }
            Ok(())
        }

        async fn resume_queue(&self, printer_uri: &str) -> Result<()> {
            self.actions
                .lock()
                .unwrap()
                .push(Action::Resume(printer_uri.into()));
            for q in self.queues.lock().unwrap().iter_mut() {
                if q.printer_uri == printer_uri {
                    q.state = QueueState::Idle;
                    q.state_message.clear();
                }
            }
            Ok(())
        }

        async fn delete_queue(&self, printer_uri: &str) -> Result<()> {
            self.actions
                .lock()
                .unwrap()
                .push(Action::Delete(printer_uri.into()));
            self.queues
                .lock()
                .unwrap()
                .retain(|q| q.printer_uri != printer_uri);
            Ok(())
        }
    }
}
