// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugwerk Print: the print-server side of a hotplug event.  CUPS client,
// connection retry, the persistent devpath -> device-URI map, the device-URI
// matcher and the queue reconciler.

pub mod cups_client;
pub mod matcher;
pub mod reconcile;
pub mod retry;
pub mod server;
pub mod uri_map;

pub use cups_client::CupsClient;
pub use matcher::{find_matching_device_uris, select_device_uris};
pub use reconcile::{QueueAction, QueueFilter, Reconciler, preferred_order};
pub use server::PrintServer;
pub use uri_map::UriMap;
