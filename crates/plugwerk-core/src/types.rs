// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Plugwerk hotplug callout.

use std::fmt;

use tracing::warn;

use crate::device_id::DeviceIdentity;

/// Upper bound on the number of device URIs tracked for one device.
///
/// A single physical device rarely has more than a handful of URIs (one per
/// backend and function).  The bound keeps a misbehaving server from growing
/// the list and the persistent map without limit.
pub const MAX_DEVICE_URIS: usize = 256;

/// An ordered, duplicate-free list of device URIs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceUriList(Vec<String>);

impl DeviceUriList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a URI.  Returns `false` if it was already present or the list
    /// is full.
    pub fn push(&mut self, uri: impl Into<String>) -> bool {
        let uri = uri.into();
        if self.contains(&uri) {
            return false;
        }
        if self.0.len() >= MAX_DEVICE_URIS {
            warn!(uri = %uri, max = MAX_DEVICE_URIS, "device URI list full, dropping URI");
            return false;
        }
        self.0.push(uri);
        true
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.0.iter().any(|u| u == uri)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

}

impl<S: Into<String>> FromIterator<S> for DeviceUriList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        for uri in iter {
            list.push(uri);
        }
        list
    }
}

impl<'a> IntoIterator for &'a DeviceUriList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for DeviceUriList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// A printer observed on the local machine by an add event.
#[derive(Debug, Clone)]
pub struct ObservedDevice {
    /// Device path of the physical device (the persistent map key).
    pub stable_devpath: String,
    /// Parsed IEEE 1284 Device ID.
    pub identity: DeviceIdentity,
    /// USB `serial` attribute, empty when the device has none.
    pub usb_serial: String,
    /// Index `N` of a `usblp` character device `lpN`, when the kernel driver
    /// has claimed the printer.
    pub usblp_index: Option<u32>,
}

/// A device as reported by the print server's device discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDevice {
    pub device_uri: String,
    /// Raw `device-id` attribute, when the backend reported one.
    pub device_id: Option<String>,
}

/// Print queue state (RFC 8011 `printer-state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Processing,
    Stopped,
}

impl QueueState {
    /// Map the IPP enum value; unknown values are treated as idle.
    pub fn from_ipp(value: i32) -> Self {
        match value {
            4 => Self::Processing,
            5 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// A configured queue on the print server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    /// `printer-uri-supported`, used to address the queue.
    pub printer_uri: String,
    pub device_uri: String,
    pub state: QueueState,
    pub state_message: String,
}

impl Queue {
    /// True if the queue was stopped by us (state message is the sentinel)
    /// rather than paused by an administrator.
    pub fn disabled_by_us(&self, sentinel: &str) -> bool {
        self.state == QueueState::Stopped && self.state_message == sentinel
    }
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Server not up yet, connection refused or timed out. May be retried.
    Transient,
    /// Anything else; retrying would repeat a decision already acted on.
    Permanent,
}
