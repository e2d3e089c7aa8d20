// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Queue reconciler: applies add/remove semantics to the queues whose device
// URI names a matched device.

use tracing::{debug, error, info, instrument};

use plugwerk_core::config::RemoveAction;
use plugwerk_core::error::Result;
use plugwerk_core::types::{DeviceUriList, Queue};
use plugwerk_core::uri;

use crate::server::PrintServer;

/// What to do to each matching queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Enable,
    Disable,
    Delete,
}

impl From<RemoveAction> for QueueAction {
    fn from(action: RemoveAction) -> Self {
        match action {
            RemoveAction::Disable => Self::Disable,
            RemoveAction::Delete => Self::Delete,
        }
    }
}

/// Which queues belong to a device.
#[derive(Debug, Clone, Copy)]
pub struct QueueFilter<'a> {
    pub uris: &'a DeviceUriList,
    /// Index of the device's usblp node, when it has one.
    pub usblp_index: Option<u32>,
    /// Act only on queues we disabled ourselves.
    pub only_disabled: bool,
}

impl QueueFilter<'_> {
    /// True if the queue's device URI names one of the device's URIs, or
    /// the device's usblp character device.
    pub fn matches(&self, queue: &Queue) -> bool {
        self.uris
            .iter()
            .any(|u| uri::equivalent(u, &queue.device_uri))
            || self
                .usblp_index
                .is_some_and(|n| uri::references_usblp(&queue.device_uri, n))
    }
}

/// Drives queue state on the print server.
pub struct Reconciler<'a, S> {
    server: &'a S,
    /// State message marking queues disabled by us.
    disabled_reason: &'a str,
}

impl<'a, S: PrintServer> Reconciler<'a, S> {
    pub fn new(server: &'a S, disabled_reason: &'a str) -> Self {
        Self {
            server,
            disabled_reason,
        }
    }

    /// Apply `action` to every queue matching `filter`.
    ///
    /// Returns the number of matching queues, including those skipped by
    /// `only_disabled`.  A failed action on one queue is logged and does not
    /// stop the others.
    #[instrument(skip_all, fields(uris = %filter.uris, ?action))]
    pub async fn for_each_matching_queue(
        &self,
        filter: QueueFilter<'_>,
        action: QueueAction,
    ) -> Result<usize> {
        let queues = self.server.list_queues().await?;
        let mut matched = 0;

        for queue in queues.iter().filter(|q| filter.matches(q)) {
            matched += 1;
            if filter.only_disabled && !queue.disabled_by_us(self.disabled_reason) {
                info!(
                    queue = %queue.printer_uri,
                    state = ?queue.state,
                    "queue matches but was not disabled by us, leaving it alone"
                );
                continue;
            }

            debug!(queue = %queue.printer_uri, "queue has matching device URI");
            if let Err(e) = self.apply(&queue.printer_uri, action).await {
                error!(queue = %queue.printer_uri, error = %e, "queue state change failed");
            }
        }

        Ok(matched)
    }

    async fn apply(&self, printer_uri: &str, action: QueueAction) -> Result<()> {
        match action {
            QueueAction::Enable => self.server.resume_queue(printer_uri).await,
            QueueAction::Disable => {
                self.server
                    .pause_queue(printer_uri, self.disabled_reason)
                    .await
            }
            QueueAction::Delete => self.server.delete_queue(printer_uri).await,
        }
    }
}

/// Order matched URIs for the queue-creation helper: the best-ranked scheme
/// first, the rest as matched.
pub fn preferred_order(uris: &DeviceUriList, preferred_schemes: &[String]) -> Vec<String> {
    let mut ordered = uris.as_slice().to_vec();
    uri::move_preferred_first(&mut ordered, preferred_schemes);
    ordered
}
