// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugwerk: core types, configuration, and error definitions shared across
// all crates, plus the IEEE 1284 Device ID parser and device-URI helpers.

pub mod config;
pub mod device_id;
pub mod error;
pub mod types;
pub mod uri;

pub use config::{HotplugConfig, RemoveAction};
pub use device_id::DeviceIdentity;
pub use error::PlugwerkError;
pub use types::*;
