// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal sysfs device walker.
//
// udev hands us a devpath such as
// `/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/usbmisc/lp0`.  The
// physical device is the nearest node (itself or an ancestor) whose uevent
// says `DEVTYPE=usb_device`; its devpath is stable for as long as the printer
// stays plugged into the same port, which is what the URI map is keyed by.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use plugwerk_core::error::{PlugwerkError, Result};

/// Root of the sysfs tree (normally `/sys`).
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
}

impl Sysfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Look up the device at `devpath`.
    ///
    /// Fails with `DeviceEnumeration` if sysfs has no such node.
    pub fn device(&self, devpath: &str) -> Result<SysfsDevice> {
        let syspath = self.root.join(devpath.trim_start_matches('/'));
        if !syspath.is_dir() {
            return Err(PlugwerkError::DeviceEnumeration(format!(
                "unable to access {}",
                syspath.display()
            )));
        }
        Ok(SysfsDevice {
            devpath: format!("/{}", devpath.trim_start_matches('/')),
            syspath,
        })
    }

    fn device_at(&self, syspath: &Path) -> Option<SysfsDevice> {
        let relative = syspath.strip_prefix(&self.root).ok()?;
        let relative = relative.to_str()?;
        if relative.is_empty() {
            return None;
        }
        Some(SysfsDevice {
            devpath: format!("/{relative}"),
            syspath: syspath.to_path_buf(),
        })
    }

    /// The device itself if it is a `usb_device`, otherwise its nearest
    /// `usb_device` ancestor.
    pub fn usb_device_for(&self, dev: &SysfsDevice) -> Option<SysfsDevice> {
        let mut current = Some(dev.syspath.as_path());
        while let Some(path) = current {
            if path == self.root {
                break;
            }
            if let Some(candidate) = self.device_at(path)
                && candidate.is_usb_device()
            {
                return Some(candidate);
            }
            current = path.parent();
        }
        None
    }
}

/// One node in the sysfs device tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsDevice {
    devpath: String,
    syspath: PathBuf,
}

impl SysfsDevice {
    /// Path relative to the sysfs root, with a leading '/'.
    pub fn devpath(&self) -> &str {
        &self.devpath
    }

    /// Last component of the devpath (e.g. `1-2:1.0`, `lp0`).
    pub fn name(&self) -> &str {
        self.devpath.rsplit('/').next().unwrap_or_default()
    }

    /// Read an attribute, trimmed.  `name` may descend through links such as
    /// `device/ieee1284_id` but never upwards.
    pub fn attr(&self, name: &str) -> Option<String> {
        if name.contains("..") || name.contains('\0') || name.starts_with('/') {
            return None;
        }
        fs::read_to_string(self.syspath.join(name))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Read a hexadecimal attribute such as `idVendor`.
    pub fn hex_attr(&self, name: &str) -> Option<u16> {
        self.attr(name)
            .and_then(|v| u16::from_str_radix(v.trim_start_matches("0x"), 16).ok())
    }

    /// Read a decimal attribute such as `busnum`.
    pub fn dec_attr<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.attr(name).and_then(|v| v.parse().ok())
    }

    /// Value of `KEY=value` from the node's `uevent` file.
    pub fn uevent_value(&self, key: &str) -> Option<String> {
        let uevent = fs::read_to_string(self.syspath.join("uevent")).ok()?;
        uevent.lines().find_map(|line| {
            let (k, v) = line.split_once('=')?;
            (k == key).then(|| v.to_string())
        })
    }

    pub fn is_usb_device(&self) -> bool {
        self.uevent_value("DEVTYPE").as_deref() == Some("usb_device")
    }

    /// Child device nodes: real subdirectories carrying a `uevent` file.
    /// Symlinks (`driver`, `subsystem`, `port`) are not followed.
    pub fn children(&self) -> Vec<SysfsDevice> {
        let entries = match fs::read_dir(&self.syspath) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %self.syspath.display(), error = %e, "cannot list device children");
                return Vec::new();
            }
        };

        let mut children: Vec<SysfsDevice> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|entry| entry.path().join("uevent").is_file())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                Some(SysfsDevice {
                    devpath: format!("{}/{name}", self.devpath),
                    syspath: entry.path(),
                })
            })
            .collect();
        children.sort_by(|a, b| a.devpath.cmp(&b.devpath));
        children
    }

    /// Index `N` of the first `usbmisc/lpN` node under this device's
    /// interfaces, or of this node itself if it is one.
    ///
    /// A missing or unreadable directory only means the usblp driver is not
    /// in play.
    pub fn usblp_index(&self) -> Option<u32> {
        if let Some(index) = parse_lp_name(self.name()) {
            return Some(index);
        }
        self.children().iter().find_map(|iface| {
            let dir = iface.syspath.join("usbmisc");
            let entries = fs::read_dir(&dir).ok()?;
            let mut indices: Vec<u32> = entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter_map(|name| parse_lp_name(&name))
                .collect();
            indices.sort_unstable();
            indices.first().copied()
        })
    }
}

fn parse_lp_name(name: &str) -> Option<u32> {
    name.strip_prefix("lp")
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| n.parse().ok())
}
