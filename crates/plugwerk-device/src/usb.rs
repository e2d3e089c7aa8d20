// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// USB printer-class GET_DEVICE_ID.
//
// The USB Printer Class specification defines a class request (bRequest 0)
// on a printer interface that returns the IEEE 1284 Device ID, preceded by a
// two-byte big-endian length that includes itself.  We look for an interface
// with class 7 (printer), subclass 1 across every configuration and alternate
// setting of the device and ask the first one that answers.

use std::time::Duration;

use nusb::DeviceInfo;
use nusb::transfer::{ControlIn, ControlType, Recipient};
use tracing::{debug, info, warn};

use plugwerk_core::error::{PlugwerkError, Result};

use crate::sysfs::SysfsDevice;

/// USB base class for printers.
const USB_CLASS_PRINTER: u8 = 0x07;

/// Printer subclass.
const USB_SUBCLASS_PRINTER: u8 = 0x01;

/// Printer class request GET_DEVICE_ID.
const GET_DEVICE_ID: u8 = 0x00;

/// Buffer size requested from the device.
const DEVICE_ID_BUFFER_LEN: u16 = 1024;

/// Identifies the USB device to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbTarget {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Bus number and device address, when sysfs exposed them.
    pub bus_address: Option<(u8, u8)>,
}

impl UsbTarget {
    /// Build a target from a `usb_device` sysfs node.
    pub fn from_sysfs(dev: &SysfsDevice) -> Result<Self> {
        let vendor_id = dev.hex_attr("idVendor").ok_or_else(|| {
            PlugwerkError::DeviceEnumeration(format!("{}: missing idVendor", dev.devpath()))
        })?;
        let product_id = dev.hex_attr("idProduct").ok_or_else(|| {
            PlugwerkError::DeviceEnumeration(format!("{}: missing idProduct", dev.devpath()))
        })?;
        let bus_address = dev
            .dec_attr::<u8>("busnum")
            .zip(dev.dec_attr::<u8>("devnum"));

        debug!(
            vendor = format_args!("{vendor_id:04x}"),
            product = format_args!("{product_id:04x}"),
            "device vendor/product"
        );
        Ok(Self {
            vendor_id,
            product_id,
            bus_address,
        })
    }

    fn matches(&self, info: &DeviceInfo) -> bool {
        info.vendor_id() == self.vendor_id && info.product_id() == self.product_id
    }

    fn is_at(&self, info: &DeviceInfo) -> bool {
        self.bus_address == Some((info.bus_number(), info.device_address()))
    }
}

/// Something that can issue GET_DEVICE_ID to a USB printer.
///
/// Implementations return the raw response, length prefix included, or
/// `None` when no printer interface answered.
#[allow(async_fn_in_trait)]
pub trait DeviceIdTransport {
    async fn fetch_device_id(&self, target: &UsbTarget) -> Result<Option<Vec<u8>>>;
}

/// Strip the two-byte big-endian length prefix from a GET_DEVICE_ID response.
///
/// The declared length counts the prefix itself; it is clamped to what was
/// actually received.  Devices that report a nonsensical length get the whole
/// remaining buffer, trailing NULs removed.
pub fn strip_length_prefix(response: &[u8]) -> &[u8] {
    if response.len() < 2 {
        return &[];
    }
    let declared = usize::from(u16::from_be_bytes([response[0], response[1]]));
    let body = &response[2..];
    let end = if declared >= 2 {
        (declared - 2).min(body.len())
    } else {
        body.len()
    };
    let body = &body[..end];
    let trimmed = body.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
    &body[..trimmed]
}

/// [`DeviceIdTransport`] backed by `nusb`.
pub struct NusbTransport {
    timeout: Duration,
}

impl NusbTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn query_device(&self, info: &DeviceInfo) -> Result<Option<Vec<u8>>> {
        let device = info
            .open()
            .map_err(|e| PlugwerkError::UsbTransport(format!("open device: {e}")))?;

        for (config_index, config) in device.configurations().enumerate() {
            for alt in config.interface_alt_settings() {
                if alt.class() != USB_CLASS_PRINTER || alt.subclass() != USB_SUBCLASS_PRINTER {
                    continue;
                }

                let number = alt.interface_number();
                let setting = alt.alternate_setting();
                let interface = match device.claim_interface(number) {
                    Ok(interface) => interface,
                    Err(e) => {
                        debug!(interface = number, error = %e, "failed to claim interface");
                        continue;
                    }
                };
                if let Err(e) = interface.set_alt_setting(setting) {
                    debug!(interface = number, setting, error = %e, "failed to set alternate setting");
                    continue;
                }

                let request = ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: GET_DEVICE_ID,
                    value: config_index as u16,
                    index: (u16::from(number) << 8) | u16::from(setting),
                    length: DEVICE_ID_BUFFER_LEN,
                };

                match tokio::time::timeout(self.timeout, interface.control_in(request)).await {
                    Ok(completion) => match completion.into_result() {
                        Ok(data) => {
                            info!(interface = number, len = data.len(), "fetched Device ID over USB");
                            return Ok(Some(data));
                        }
                        Err(e) => warn!(interface = number, error = %e, "failed to fetch Device ID"),
                    },
                    Err(_) => warn!(
                        interface = number,
                        timeout_s = self.timeout.as_secs(),
                        "GET_DEVICE_ID timed out"
                    ),
                }
            }
        }

        Ok(None)
    }
}

impl DeviceIdTransport for NusbTransport {
    async fn fetch_device_id(&self, target: &UsbTarget) -> Result<Option<Vec<u8>>> {
        let mut candidates: Vec<DeviceInfo> = nusb::list_devices()
            .map_err(|e| PlugwerkError::UsbTransport(format!("list devices: {e}")))?
            .filter(|info| target.matches(info))
            .collect();

        // The device at the exact bus address first; identical models on
        // other ports are only a fallback.
        candidates.sort_by_key(|info| !target.is_at(info));

        for info in &candidates {
            match self.query_device(info).await {
                Ok(Some(data)) => return Ok(Some(data)),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "skipping device"),
            }
        }
        Ok(None)
    }
}
