// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugwerk Device: finds out who a freshly attached printer is.
//
// Given the device path of a hotplug event (or a Bluetooth address), resolve
// the stable physical-device path and obtain the printer's IEEE 1284 Device
// ID and USB serial number.  Sources are tried in order: an ID the kernel
// already exposed in sysfs, a USB GET_DEVICE_ID class request, and the CUPS
// Bluetooth backend.

pub mod acquire;
pub mod bluetooth;
pub mod sysfs;
pub mod usb;

pub use acquire::{Acquisition, DeviceIdAcquirer};
pub use bluetooth::BluetoothHelper;
pub use sysfs::{Sysfs, SysfsDevice};
pub use usb::{DeviceIdTransport, NusbTransport, UsbTarget};
