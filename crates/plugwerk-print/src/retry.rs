// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry policy for reaching the print server.
//
// An add event can race the scheduler starting up, so the initial connection
// is retried a bounded number of times with a fixed backoff.  Nothing else is
// retried: once a queue has been enabled, paused or deleted the decision has
// been acted on, and repeating it blindly is wrong.

use std::time::Duration;

use plugwerk_core::config::HotplugConfig;
use plugwerk_core::error::PlugwerkError;
use plugwerk_core::types::ErrorClass;
use tracing::{debug, info, warn};

/// Retry configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Attempts after the first one.  Zero means fail fast.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&HotplugConfig> for RetryConfig {
    fn from(config: &HotplugConfig) -> Self {
        Self {
            max_retries: config.connect_retries,
            delay: config.connect_backoff(),
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry; the error is not transient.
    GiveUp,
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify an error for retry decisions.
pub fn classify_error(err: &PlugwerkError) -> ErrorClass {
    match err {
        PlugwerkError::ServerUnreachable(_) => ErrorClass::Transient,
        PlugwerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::Interrupted => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        },
        PlugwerkError::IppRequest(detail) => classify_ipp_detail(detail),
        _ => ErrorClass::Permanent,
    }
}

/// Transport-level failures reported by the IPP client as text.
fn classify_ipp_detail(detail: &str) -> ErrorClass {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("broken pipe")
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

/// Decide whether to retry after `attempt` failed attempts.
pub fn should_retry(err: &PlugwerkError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Permanent => {
            info!(error = %err, "permanent error, not retrying");
            RetryDecision::GiveUp
        }
        ErrorClass::Transient => {
            if attempt >= config.max_retries {
                warn!(attempt, max = config.max_retries, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                debug!(attempt, delay_ms = config.delay.as_millis(), "scheduling retry");
                RetryDecision::RetryAfter(config.delay)
            }
        }
    }
}
