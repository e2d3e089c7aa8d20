// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Plugwerk.

use thiserror::Error;

/// Top-level error type for all Plugwerk operations.
///
/// Outcomes that are not failures (device already handled, no matching
/// device URI, no matching queue) are not represented here; they are
/// reported through the add/remove outcome enums instead.
#[derive(Debug, Error)]
pub enum PlugwerkError {
    // -- Device errors --
    #[error("invalid IEEE 1284 Device ID: {0}")]
    InvalidDeviceId(String),

    #[error("device enumeration failed: {0}")]
    DeviceEnumeration(String),

    #[error("USB transfer failed: {0}")]
    UsbTransport(String),

    #[error("Bluetooth Device ID query failed: {0}")]
    Bluetooth(String),

    // -- Print server errors --
    #[error("print server unreachable: {0}")]
    ServerUnreachable(String),

    #[error("IPP request failed: {0}")]
    IppRequest(String),

    #[error("{operation} returned status 0x{status:04x}")]
    PrintServer { operation: &'static str, status: u16 },

    // -- Persistence --
    #[error("USB URI map error: {0}")]
    UriMap(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Process / configuration --
    #[error("queue creation helper failed: {0}")]
    Helper(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PlugwerkError>;
