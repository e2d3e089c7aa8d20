// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device identity acquisition.
//
// One physical attach fires several hotplug events (the raw USB device, its
// printer interface, the usblp node).  All of them resolve to the same
// stable devpath, so whichever event claims that path in the URI map first
// does the work and the others are told `AlreadyHandled`.

use tracing::{debug, info, warn};

use plugwerk_core::device_id::DeviceIdentity;
use plugwerk_core::error::{PlugwerkError, Result};
use plugwerk_core::types::ObservedDevice;

use crate::bluetooth::{BluetoothHelper, is_bluetooth_address};
use crate::sysfs::{Sysfs, SysfsDevice};
use crate::usb::{DeviceIdTransport, UsbTarget, strip_length_prefix};

/// Result of looking at a device for an add event.
#[derive(Debug, Clone)]
pub enum Acquisition {
    /// The device was identified (possibly with an empty identity, which the
    /// caller must reject).
    Observed(ObservedDevice),
    /// Another event for the same physical device got here first.
    AlreadyHandled { stable_devpath: String },
}

/// Obtains the Device ID and USB serial for a hotplug device.
pub struct DeviceIdAcquirer<T> {
    sysfs: Sysfs,
    transport: T,
    bluetooth: BluetoothHelper,
}

impl<T: DeviceIdTransport> DeviceIdAcquirer<T> {
    pub fn new(sysfs: Sysfs, transport: T, bluetooth: BluetoothHelper) -> Self {
        Self {
            sysfs,
            transport,
            bluetooth,
        }
    }

    /// Identify `device` (a devpath or a Bluetooth address).
    ///
    /// `is_claimed` reports whether a stable devpath already has an entry in
    /// the URI map.  Fails only if the device cannot be found at all; a
    /// device whose Device ID could not be read comes back `Observed` with an
    /// empty identity.
    pub async fn acquire(
        &self,
        device: &str,
        is_claimed: impl Fn(&str) -> bool,
    ) -> Result<Acquisition> {
        if is_bluetooth_address(device) {
            return Ok(self.acquire_bluetooth(device, is_claimed).await);
        }

        let dev = self.sysfs.device(device)?;
        let parent = self.sysfs.usb_device_for(&dev).ok_or_else(|| {
            PlugwerkError::DeviceEnumeration(format!("{device}: no parent USB device"))
        })?;
        let stable_devpath = parent.devpath().to_string();
        debug!(devpath = %stable_devpath, "parent devpath");

        if is_claimed(&stable_devpath) {
            info!(devpath = %stable_devpath, "device already handled");
            return Ok(Acquisition::AlreadyHandled { stable_devpath });
        }

        let usb_serial = parent.attr("serial").unwrap_or_default();
        let usblp_index = parent.usblp_index().or_else(|| dev.usblp_index());

        let identity = match sysfs_device_id(&dev, &parent) {
            Some(raw) => {
                debug!("Device ID exposed by the kernel driver");
                DeviceIdentity::parse_str(&raw)
            }
            None => self.usb_device_id(&parent).await,
        };

        debug!(
            identity = %identity,
            serial = if usb_serial.is_empty() { "-" } else { usb_serial.as_str() },
            usblp = ?usblp_index,
            "device identified"
        );

        Ok(Acquisition::Observed(ObservedDevice {
            stable_devpath,
            identity,
            usb_serial,
            usblp_index,
        }))
    }

    async fn usb_device_id(&self, parent: &SysfsDevice) -> DeviceIdentity {
        let target = match UsbTarget::from_sysfs(parent) {
            Ok(target) => target,
            Err(e) => {
                warn!(error = %e, "cannot address USB device");
                return DeviceIdentity::default();
            }
        };

        match self.transport.fetch_device_id(&target).await {
            Ok(Some(response)) => DeviceIdentity::parse(strip_length_prefix(&response)),
            Ok(None) => {
                warn!("no printer interface answered GET_DEVICE_ID");
                DeviceIdentity::default()
            }
            Err(e) => {
                warn!(error = %e, "USB Device ID query failed");
                DeviceIdentity::default()
            }
        }
    }

    async fn acquire_bluetooth(
        &self,
        address: &str,
        is_claimed: impl Fn(&str) -> bool,
    ) -> Acquisition {
        let stable_devpath = address.to_ascii_uppercase();
        if is_claimed(&stable_devpath) {
            info!(address = %stable_devpath, "device already handled");
            return Acquisition::AlreadyHandled { stable_devpath };
        }

        let identity = match self.bluetooth.fetch_device_id(&stable_devpath).await {
            Ok(raw) => DeviceIdentity::parse(&raw),
            Err(e) => {
                warn!(error = %e, "Bluetooth Device ID query failed");
                DeviceIdentity::default()
            }
        };

        Acquisition::Observed(ObservedDevice {
            stable_devpath,
            identity,
            usb_serial: String::new(),
            usblp_index: None,
        })
    }
}

/// A Device ID the usblp driver already read: on the triggering node's
/// device, on the node itself, or on one of the USB device's interfaces.
fn sysfs_device_id(dev: &SysfsDevice, parent: &SysfsDevice) -> Option<String> {
    dev.attr("device/ieee1284_id")
        .or_else(|| dev.attr("ieee1284_id"))
        .or_else(|| {
            parent
                .children()
                .iter()
                .find_map(|iface| iface.attr("ieee1284_id"))
        })
}
