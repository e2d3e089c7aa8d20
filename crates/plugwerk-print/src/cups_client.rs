// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async IPP client for the local CUPS scheduler.
//
// Uses the `ipp` crate's async API to send the operations the hotplug flows
// need:
//   - CUPS-Get-Devices    (backend device discovery)
//   - CUPS-Get-Printers   (configured queues)
//   - Pause-Printer       (RFC 8011 §4.3.11)
//   - Resume-Printer      (RFC 8011 §4.3.12)
//   - CUPS-Delete-Printer

use std::time::Duration;

use ipp::prelude::*;
use tokio::net::TcpStream;
use tracing::{debug, error, info, instrument, warn};

use plugwerk_core::config::HotplugConfig;
use plugwerk_core::error::{PlugwerkError, Result};
use plugwerk_core::types::{Queue, QueueState, ServerDevice};

use crate::retry::{RetryConfig, RetryDecision, should_retry};
use crate::server::PrintServer;

/// Highest status code treated as success (successful-ok-conflicting-attributes).
const STATUS_OK_CONFLICT: u16 = 0x0002;

/// client-error-not-found; CUPS-Get-Printers answers this when no queues exist.
const STATUS_NOT_FOUND: u16 = 0x0406;

/// Upper bound on a single request, including device discovery which waits
/// on every backend.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on one TCP connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Attributes requested from CUPS-Get-Printers.
const QUEUE_ATTRIBUTES: [&str; 4] = [
    "printer-uri-supported",
    "device-uri",
    "printer-state",
    "printer-state-message",
];

/// [`PrintServer`] backed by a CUPS scheduler.
pub struct CupsClient {
    /// Scheduler root, e.g. `ipp://localhost:631/`.
    root: Uri,
    /// Administrative endpoint, e.g. `ipp://localhost:631/admin/`.
    admin: Uri,
}

impl CupsClient {
    /// Create a client for the scheduler at `server_url` (`ipp://host:port`).
    pub fn new(server_url: &str) -> Result<Self> {
        let base = server_url.trim_end_matches('/');
        Ok(Self {
            root: parse_uri(&format!("{base}/"))?,
            admin: parse_uri(&format!("{base}/admin/"))?,
        })
    }

    /// Wait for the scheduler to accept connections, then create a client.
    ///
    /// Connection attempts are retried per `config.connect_retries` with a
    /// fixed backoff; with zero retries a refused connection fails at once.
    #[instrument(skip_all, fields(host = %config.server_host, port = config.server_port))]
    pub async fn connect(config: &HotplugConfig) -> Result<Self> {
        let retry = RetryConfig::from(config);
        let addr = format!("{}:{}", config.server_host, config.server_port);
        let mut attempt = 0;

        loop {
            match probe(&addr).await {
                Ok(()) => {
                    debug!(attempt, "print server reachable");
                    return Self::new(&config.server_url());
                }
                Err(e) => match should_retry(&e, attempt, &retry) {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(error = %e, attempt, "print server not reachable yet");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp | RetryDecision::Exhausted => {
                        error!(error = %e, "failed to connect to print server");
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Send a request and check its status.
    async fn send(
        &self,
        target: &Uri,
        request: IppRequestResponse,
        name: &'static str,
    ) -> Result<IppRequestResponse> {
        let client = AsyncIppClient::new(target.clone());
        let response = tokio::time::timeout(REQUEST_TIMEOUT, client.send(request))
            .await
            .map_err(|_| {
                PlugwerkError::IppRequest(format!(
                    "{name}: timed out after {}s",
                    REQUEST_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| PlugwerkError::IppRequest(format!("{name}: {e}")))?;

        let status = response.header().operation_or_status;
        if status > STATUS_OK_CONFLICT {
            return Err(PlugwerkError::PrintServer {
                operation: name,
                status,
            });
        }
        Ok(response)
    }

    fn request(&self, operation: Operation, printer_uri: Option<Uri>) -> IppRequestResponse {
        IppRequestResponse::new(IppVersion::v1_1(), operation, printer_uri)
    }
}

impl PrintServer for CupsClient {
    #[instrument(skip(self))]
    async fn list_devices(&self, exclude_schemes: &[String]) -> Result<Vec<ServerDevice>> {
        let mut request = self.request(Operation::CupsGetDevices, None);
        if !exclude_schemes.is_empty() {
            let schemes = exclude_schemes
                .iter()
                .map(|s| IppValue::NameWithoutLanguage(s.clone().into()))
                .collect();
            request.attributes_mut().add(
                DelimiterTag::OperationAttributes,
                IppAttribute::new("exclude-schemes", IppValue::Array(schemes)),
            );
        }

        debug!("sending CUPS-Get-Devices");
        let response = self.send(&self.root, request, "CUPS-Get-Devices").await?;
        let devices = parse_devices(response.attributes());
        debug!(count = devices.len(), "received device list");
        Ok(devices)
    }

    #[instrument(skip(self))]
    async fn list_queues(&self) -> Result<Vec<Queue>> {
        let mut request = self.request(Operation::CupsGetPrinters, None);
        let requested = QUEUE_ATTRIBUTES
            .iter()
            .map(|a| IppValue::Keyword(a.to_string().into()))
            .collect();
        request.attributes_mut().add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new("requested-attributes", IppValue::Array(requested)),
        );

        debug!("sending CUPS-Get-Printers");
        match self.send(&self.root, request, "CUPS-Get-Printers").await {
            Ok(response) => {
                let queues = parse_queues(response.attributes());
                debug!(count = queues.len(), "received queue list");
                Ok(queues)
            }
            Err(PlugwerkError::PrintServer {
                status: STATUS_NOT_FOUND,
                ..
            }) => {
                debug!("no queues configured");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, message))]
    async fn pause_queue(&self, printer_uri: &str, message: &str) -> Result<()> {
        let mut request = self.request(Operation::PausePrinter, Some(parse_uri(printer_uri)?));
        request.attributes_mut().add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(
                "printer-state-message",
                IppValue::TextWithoutLanguage(message.to_string().into()),
            ),
        );
        self.send(&self.admin, request, "Pause-Printer").await?;
        info!("disabled queue as the corresponding device was unplugged or turned off");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn resume_queue(&self, printer_uri: &str) -> Result<()> {
        let request = self.request(Operation::ResumePrinter, Some(parse_uri(printer_uri)?));
        self.send(&self.admin, request, "Resume-Printer").await?;
        info!("re-enabled queue");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_queue(&self, printer_uri: &str) -> Result<()> {
        let request = self.request(Operation::CupsDeletePrinter, Some(parse_uri(printer_uri)?));
        self.send(&self.admin, request, "CUPS-Delete-Printer").await?;
        info!("deleted queue");
        Ok(())
    }
}

/// One TCP connection attempt to the scheduler.
async fn probe(addr: &str) -> Result<()> {
    tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            PlugwerkError::ServerUnreachable(format!(
                "{addr}: timed out after {}s",
                CONNECT_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| PlugwerkError::ServerUnreachable(format!("{addr}: {e}")))?;
    Ok(())
}

fn parse_uri(uri: &str) -> Result<Uri> {
    uri.parse()
        .map_err(|e| PlugwerkError::IppRequest(format!("invalid URI '{uri}': {e}")))
}

// ---------------------------------------------------------------------------
// Helper functions for parsing IPP responses
// ---------------------------------------------------------------------------

/// String form of an attribute value; first element for multi-valued ones.
fn text_value(value: &IppValue) -> Option<String> {
    let value = match value {
        IppValue::Array(values) => values.first()?,
        other => other,
    };
    let text = value.to_string();
    (!text.is_empty()).then_some(text)
}

/// Each discovered device is its own printer-attributes group.
fn parse_devices(attrs: &IppAttributes) -> Vec<ServerDevice> {
    attrs
        .groups_of(DelimiterTag::PrinterAttributes)
        .filter_map(|group| {
            let attributes = group.attributes();
            let device_uri = attributes.get("device-uri").and_then(|a| text_value(a.value()))?;
            let device_id = attributes.get("device-id").and_then(|a| text_value(a.value()));
            Some(ServerDevice {
                device_uri,
                device_id,
            })
        })
        .collect()
}

/// Queues without a device URI cannot match anything and are skipped.
fn parse_queues(attrs: &IppAttributes) -> Vec<Queue> {
    attrs
        .groups_of(DelimiterTag::PrinterAttributes)
        .filter_map(|group| {
            let attributes = group.attributes();
            let printer_uri = attributes
                .get("printer-uri-supported")
                .and_then(|a| text_value(a.value()))?;
            let device_uri = attributes.get("device-uri").and_then(|a| text_value(a.value()))?;
            let state = match attributes.get("printer-state").map(|a| a.value()) {
                Some(IppValue::Enum(v)) | Some(IppValue::Integer(v)) => QueueState::from_ipp(*v),
                _ => QueueState::Idle,
            };
            let state_message = attributes
                .get("printer-state-message")
                .and_then(|a| text_value(a.value()))
                .unwrap_or_default();
            Some(Queue {
                printer_uri,
                device_uri,
                state,
                state_message,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_builds_root_and_admin_endpoints() {
        let client = CupsClient::new("ipp://localhost:631").unwrap();
        assert_eq!(client.root.to_string(), "ipp://localhost:631/");
        assert_eq!(client.admin.to_string(), "ipp://localhost:631/admin/");
    }

    #[test]
    fn new_rejects_invalid_uri() {
        assert!(CupsClient::new("not a valid uri %%%").is_err());
    }

    #[tokio::test]
    async fn connect_fails_fast_without_retries() {
        // Grab a free port, then close it so the connection is refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = HotplugConfig {
            server_host: "127.0.0.1".into(),
            server_port: port,
            connect_retries: 0,
            ..Default::default()
        };
        let err = CupsClient::connect(&config).await.err().unwrap();
        assert!(matches!(err, PlugwerkError::ServerUnreachable(_)));
    }

    #[tokio::test]
    async fn connect_succeeds_when_listening() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = HotplugConfig {
            server_host: "127.0.0.1".into(),
            server_port: port,
            connect_retries: 0,
            ..Default::default()
        };
        assert!(CupsClient::connect(&config).await.is_ok());
    }

    #[test]
    fn parses_queue_groups() {
        let mut attrs = IppAttributes::new();
        attrs.add(
            DelimiterTag::PrinterAttributes,
            IppAttribute::new(
                "printer-uri-supported",
                IppValue::Uri("ipp://localhost/printers/inkjet".to_string().into()),
            ),
        );
        attrs.add(
            DelimiterTag::PrinterAttributes,
            IppAttribute::new("device-uri", IppValue::Uri("usb://Acme/Inkjet3000".to_string().into())),
        );
        attrs.add(
            DelimiterTag::PrinterAttributes,
            IppAttribute::new("printer-state", IppValue::Enum(5)),
        );

        let queues = parse_queues(&attrs);
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].device_uri, "usb://Acme/Inkjet3000");
        assert_eq!(queues[0].state, QueueState::Stopped);
        assert!(queues[0].state_message.is_empty());
    }
}
