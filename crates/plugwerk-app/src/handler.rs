// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Add and remove event flows.
//
// add:    acquire identity -> match device URIs (records them) -> re-enable
//         queues we disabled, or start the queue-creation helper
// remove: look up recorded URIs -> disable (or delete) matching queues ->
//         forget the entry
//
// Both flows hold the URI map lock from start to finish.

use std::fmt;
use std::future::Future;

use tracing::{info, instrument, warn};

use plugwerk_core::config::HotplugConfig;
use plugwerk_core::error::Result;
use plugwerk_device::bluetooth::is_bluetooth_address;
use plugwerk_device::{Acquisition, DeviceIdAcquirer, DeviceIdTransport};
use plugwerk_print::{
    PrintServer, QueueAction, QueueFilter, Reconciler, UriMap, find_matching_device_uris,
    preferred_order,
};

use crate::helper::HelperTracker;

/// How an add event ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Another event for the same device got there first.
    AlreadyHandled { devpath: String },
    /// The print server does not know the device.
    NoMatchingDevice,
    /// Existing queues serve the device; those we had disabled were
    /// re-enabled.
    QueuesMatched { count: usize },
    /// No queue serves the device; the helper was started with this URI
    /// ranked first.
    QueueCreationStarted { uri: String },
}

impl fmt::Display for AddOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyHandled { devpath } => write!(f, "device {devpath} already handled"),
            Self::NoMatchingDevice => write!(f, "no matching device URIs"),
            Self::QueuesMatched { count } => write!(f, "{count} existing queue(s) match"),
            Self::QueueCreationStarted { uri } => write!(f, "creating a queue for {uri}"),
        }
    }
}

/// How a remove event ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Nothing was recorded for the device.
    NotMapped,
    /// The recorded entry was consumed; `count` queues matched.
    QueuesUpdated { devpath: String, count: usize },
}

impl fmt::Display for RemoveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMapped => write!(f, "no device URIs recorded"),
            Self::QueuesUpdated { devpath, count } => {
                write!(f, "{count} queue(s) updated for {devpath}")
            }
        }
    }
}

/// Runs hotplug events against one configuration.
pub struct EventHandler<'a, T> {
    config: &'a HotplugConfig,
    acquirer: DeviceIdAcquirer<T>,
    helpers: HelperTracker,
}

impl<'a, T: DeviceIdTransport> EventHandler<'a, T> {
    pub fn new(config: &'a HotplugConfig, acquirer: DeviceIdAcquirer<T>) -> Self {
        Self {
            config,
            acquirer,
            helpers: HelperTracker::new(),
        }
    }

    /// Handle an add event for `device` (devpath or Bluetooth address).
    ///
    /// `connect` is only called once the device is known to need the print
    /// server, so duplicate events do not wait on it.
    #[instrument(skip(self, connect))]
    pub async fn add<S, F, Fut>(&mut self, device: &str, connect: F) -> Result<AddOutcome>
    where
        S: PrintServer,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S>>,
    {
        let map = UriMap::open_for_update(&self.config.uri_map_path)?;

        let observed = match self.acquirer.acquire(device, |p| map.contains(p)).await? {
            Acquisition::AlreadyHandled { stable_devpath } => {
                return Ok(AddOutcome::AlreadyHandled {
                    devpath: stable_devpath,
                });
            }
            Acquisition::Observed(observed) => observed,
        };
        observed.identity.ensure_valid()?;
        info!(identity = %observed.identity, devpath = %observed.stable_devpath, "device identified");

        let server = connect().await?;
        let uris = find_matching_device_uris(&server, self.config, &observed, map).await?;
        if uris.is_empty() {
            return Ok(AddOutcome::NoMatchingDevice);
        }

        let filter = QueueFilter {
            uris: &uris,
            usblp_index: observed.usblp_index,
            only_disabled: true,
        };
        let count = Reconciler::new(&server, &self.config.disabled_reason)
            .for_each_matching_queue(filter, QueueAction::Enable)
            .await?;
        if count > 0 {
            return Ok(AddOutcome::QueuesMatched { count });
        }

        let ordered = preferred_order(&uris, &self.config.preferred_schemes);
        self.helpers.spawn(
            &self.config.add_printer_helper,
            &observed.identity.full_text,
            &ordered,
        )?;
        Ok(AddOutcome::QueueCreationStarted {
            uri: ordered.first().cloned().unwrap_or_default(),
        })
    }

    /// Handle a remove event for `device`.
    ///
    /// The device is gone, so its queues are found through the recorded
    /// URIs only.  The entry is dropped even if the print server could not
    /// be reached, so that the next add is not mistaken for a duplicate.
    #[instrument(skip(self, connect))]
    pub async fn remove<S, F, Fut>(&self, device: &str, connect: F) -> Result<RemoveOutcome>
    where
        S: PrintServer,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S>>,
    {
        let mut map = UriMap::open_for_update(&self.config.uri_map_path)?;
        let devpath = map_key(device);

        let Some(key) = map.find_ancestor(&devpath).map(str::to_owned) else {
            return Ok(RemoveOutcome::NotMapped);
        };
        let uris = map.remove(&key).unwrap_or_default();

        let updated = async {
            let server = connect().await?;
            let filter = QueueFilter {
                uris: &uris,
                usblp_index: None,
                only_disabled: false,
            };
            Reconciler::new(&server, &self.config.disabled_reason)
                .for_each_matching_queue(filter, self.config.remove_action.into())
                .await
        }
        .await;

        map.commit()?;
        let count = updated?;
        Ok(RemoveOutcome::QueuesUpdated {
            devpath: key,
            count,
        })
    }

    /// Reap queue-creation helpers before exit.
    pub async fn finish(self) {
        if self.helpers.is_empty() {
            return;
        }
        let launched = self.helpers.len();
        let reaped = self.helpers.wait_all(self.config.helper_wait()).await;
        if reaped < launched {
            warn!(launched, reaped, "not all queue creation helpers finished");
        }
    }
}

/// The key a device is recorded under: upper-case for Bluetooth addresses,
/// a rooted devpath otherwise.
fn map_key(device: &str) -> String {
    if is_bluetooth_address(device) {
        device.to_ascii_uppercase()
    } else {
        format!("/{}", device.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use plugwerk_core::error::PlugwerkError;
    use plugwerk_core::types::{Queue, QueueState, ServerDevice};
    use plugwerk_device::{BluetoothHelper, Sysfs, UsbTarget};

    use super::*;

    const SENTINEL: &str = "Unplugged or turned off";
    const USB_DEVICE: &str = "/devices/pci0000:00/usb1/1-2";
    const USBLP: &str = "/devices/pci0000:00/usb1/1-2/1-2:1.0/usbmisc/lp0";
    const DEVICE_URI: &str = "usb://Acme/Inkjet3000?serial=XYZ123";

    /// Minimal in-memory print server.
    #[derive(Default)]
    struct Server {
        devices: Vec<ServerDevice>,
        queues: Mutex<Vec<Queue>>,
    }

    impl Server {
        fn knowing_printer() -> Self {
            Self {
                devices: vec![ServerDevice {
                    device_uri: DEVICE_URI.into(),
                    device_id: Some("MFG:Acme;MDL:Inkjet3000;".into()),
                }],
                ..Default::default()
            }
        }

        fn with_queue(self, state: QueueState, message: &str) -> Self {
            self.queues.lock().unwrap().push(Queue {
                printer_uri: "ipp://localhost/printers/inkjet".into(),
                device_uri: DEVICE_URI.into(),
                state,
                state_message: message.into(),
            });
            self
        }

        fn queue(&self) -> Queue {
            self.queues.lock().unwrap()[0].clone()
        }

        fn set_state(&self, uri: &str, state: QueueState, message: &str) {
            for q in self.queues.lock().unwrap().iter_mut() {
                if q.printer_uri == uri {
                    q.state = state;
                    q.state_message = message.into();
                }
            }
        }
    }

    impl PrintServer for &Server {
        async fn list_devices(&self, _exclude: &[String]) -> Result<Vec<ServerDevice>> {
            Ok(self.devices.clone())
        }

        async fn list_queues(&self) -> Result<Vec<Queue>> {
            Ok(self.queues.lock().unwrap().clone())
        }

        async fn pause_queue(&self, uri: &str, message: &str) -> Result<()> {
            self.set_state(uri, QueueState::Stopped, message);
            Ok(())
        }

        async fn resume_queue(&self, uri: &str) -> Result<()> {
            self.set_state(uri, QueueState::Idle, "");
            Ok(())
        }

        async fn delete_queue(&self, uri: &str) -> Result<()> {
            self.queues.lock().unwrap().retain(|q| q.printer_uri != uri);
            Ok(())
        }
    }

    /// The sysfs tree always carries an ID, so USB is never asked.
    struct NoUsb;

    impl DeviceIdTransport for NoUsb {
        async fn fetch_device_id(&self, _target: &UsbTarget) -> Result<Option<Vec<u8>>> {
            panic!("USB transport should not be used");
        }
    }

    fn write(root: &Path, devpath: &str, name: &str, contents: &str) {
        let dir = root.join(devpath.trim_start_matches('/'));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), contents).unwrap();
    }

    fn printer_tree(root: &Path, device_id: &str) {
        let iface = "/devices/pci0000:00/usb1/1-2/1-2:1.0";
        write(root, USB_DEVICE, "uevent", "DEVTYPE=usb_device\n");
        write(root, USB_DEVICE, "idVendor", "04a9\n");
        write(root, USB_DEVICE, "idProduct", "1234\n");
        write(root, USB_DEVICE, "serial", "XYZ123\n");
        write(root, iface, "uevent", "DEVTYPE=usb_interface\n");
        write(root, iface, "ieee1284_id", device_id);
        write(root, USBLP, "uevent", "DEVNAME=usb/lp0\n");
    }

    fn config(dir: &Path) -> HotplugConfig {
        HotplugConfig {
            uri_map_path: dir.join("run/usb-uris"),
            sysfs_root: dir.join("sys"),
            add_printer_helper: "true".into(),
            settle_delay_ms: 0,
            ..Default::default()
        }
    }

    fn handler(config: &HotplugConfig) -> EventHandler<'_, NoUsb> {
        let acquirer = DeviceIdAcquirer::new(
            Sysfs::new(&config.sysfs_root),
            NoUsb,
            BluetoothHelper::new("/nonexistent/bluetooth", Duration::from_secs(1)),
        );
        EventHandler::new(config, acquirer)
    }

    #[tokio::test]
    async fn replug_cycle_disables_then_reenables() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        printer_tree(&config.sysfs_root, "MFG:Acme;MDL:Inkjet3000;\n");
        let server = Server::knowing_printer().with_queue(QueueState::Idle, "");

        let mut events = handler(&config);
        let added = events.add(USB_DEVICE, || async { Ok(&server) }).await.unwrap();
        // The queue is idle, not disabled by us: matched, left alone.
        assert_eq!(added, AddOutcome::QueuesMatched { count: 1 });
        assert_eq!(server.queue().state, QueueState::Idle);

        // Second trigger for the same attach (the usblp node).
        let again = events.add(USBLP, || async { Ok(&server) }).await.unwrap();
        assert_eq!(
            again,
            AddOutcome::AlreadyHandled {
                devpath: USB_DEVICE.into()
            }
        );

        // Unplug: the child node resolves to the recorded device.
        let removed = events.remove(USBLP, || async { Ok(&server) }).await.unwrap();
        assert_eq!(
            removed,
            RemoveOutcome::QueuesUpdated {
                devpath: USB_DEVICE.into(),
                count: 1
            }
        );
        assert!(server.queue().disabled_by_us(SENTINEL));

        // Second remove trigger finds nothing left.
        let removed = events.remove(USB_DEVICE, || async { Ok(&server) }).await.unwrap();
        assert_eq!(removed, RemoveOutcome::NotMapped);

        // Replug re-enables the queue.
        let added = events.add(USB_DEVICE, || async { Ok(&server) }).await.unwrap();
        assert_eq!(added, AddOutcome::QueuesMatched { count: 1 });
        assert_eq!(server.queue().state, QueueState::Idle);
    }

    #[tokio::test]
    async fn admin_paused_queue_is_not_reenabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        printer_tree(&config.sysfs_root, "MFG:Acme;MDL:Inkjet3000;");
        let server = Server::knowing_printer().with_queue(QueueState::Stopped, "paused by admin");

        let mut events = handler(&config);
        let added = events.add(USB_DEVICE, || async { Ok(&server) }).await.unwrap();
        assert_eq!(added, AddOutcome::QueuesMatched { count: 1 });
        assert_eq!(server.queue().state_message, "paused by admin");
    }

    #[tokio::test]
    async fn unknown_queue_starts_helper() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        printer_tree(&config.sysfs_root, "MFG:Acme;MDL:Inkjet3000;");
        let server = Server::knowing_printer();

        let mut events = handler(&config);
        let added = events.add(USB_DEVICE, || async { Ok(&server) }).await.unwrap();
        assert_eq!(
            added,
            AddOutcome::QueueCreationStarted {
                uri: DEVICE_URI.into()
            }
        );
        events.finish().await;
    }

    #[tokio::test]
    async fn unknown_device_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        printer_tree(&config.sysfs_root, "MFG:Other;MDL:Thing;");
        let server = Server::knowing_printer();

        let mut events = handler(&config);
        let added = events.add(USB_DEVICE, || async { Ok(&server) }).await.unwrap();
        assert_eq!(added, AddOutcome::NoMatchingDevice);
        assert!(UriMap::open_for_update(&config.uri_map_path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_identity_stops_before_server() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        printer_tree(&config.sysfs_root, "MFG:Acme;CMD:PCL;");

        let mut events = handler(&config);
        // Connecting would fail differently, so the error shows it never ran.
        let err = events
            .add(USB_DEVICE, || async {
                Err::<&Server, _>(PlugwerkError::ServerUnreachable("refused".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PlugwerkError::InvalidDeviceId(_)));
        assert!(UriMap::open_for_update(&config.uri_map_path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_policy_removes_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.remove_action = plugwerk_core::config::RemoveAction::Delete;
        printer_tree(&config.sysfs_root, "MFG:Acme;MDL:Inkjet3000;");
        let server = Server::knowing_printer().with_queue(QueueState::Idle, "");

        let mut events = handler(&config);
        events.add(USB_DEVICE, || async { Ok(&server) }).await.unwrap();
        events.remove(USB_DEVICE, || async { Ok(&server) }).await.unwrap();
        assert!(server.queues.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_on_remove_still_forgets_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        printer_tree(&config.sysfs_root, "MFG:Acme;MDL:Inkjet3000;");
        let server = Server::knowing_printer();

        let mut events = handler(&config);
        events.add(USB_DEVICE, || async { Ok(&server) }).await.unwrap();

        let err = events
            .remove(USB_DEVICE, || async {
                Err::<&Server, _>(PlugwerkError::ServerUnreachable("refused".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PlugwerkError::ServerUnreachable(_)));
        assert!(UriMap::open_for_update(&config.uri_map_path).unwrap().is_empty());
    }

    #[test]
    fn map_keys() {
        assert_eq!(map_key("devices/usb1/1-2"), "/devices/usb1/1-2");
        assert_eq!(map_key("/devices/usb1/1-2"), "/devices/usb1/1-2");
        assert_eq!(map_key("00:1a:7d:da:71:13"), "00:1A:7D:DA:71:13");
    }
}
