// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IEEE 1284 Device ID parsing.
//
// A Device ID is a sequence of `KEY:value;` fields, e.g.
//
//   MFG:Acme;MDL:Inkjet 3000;CMD:PCL,PJL;CLS:PRINTER;SN:XYZ123;
//
// Only the manufacturer, model and serial number are of interest here.  Keys
// are compared case-insensitively against a fixed alias table and the first
// occurrence of each concept wins.

use std::fmt;

use crate::error::{PlugwerkError, Result};

const MANUFACTURER_KEYS: &[&str] = &["MANUFACTURER", "MFG"];
const MODEL_KEYS: &[&str] = &["MODEL", "MDL"];
const SERIAL_KEYS: &[&str] = &["SERIALNUMBER", "SERN", "SN"];

/// A parsed IEEE 1284 Device ID.
///
/// Partial identities are valid parser output.  Whether an identity is good
/// enough to act on is decided by [`DeviceIdentity::ensure_valid`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// The raw Device ID, minus any trailing newline.
    pub full_text: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
}

impl DeviceIdentity {
    /// Parse a raw Device ID.
    ///
    /// Non-UTF-8 bytes are replaced rather than rejected; devices are not
    /// always careful about the character set they report.
    pub fn parse(raw: &[u8]) -> Self {
        if raw.is_empty() {
            return Self::default();
        }

        let text = String::from_utf8_lossy(raw);
        let text = text.strip_suffix('\n').unwrap_or(&text);
        let mut id = Self {
            full_text: text.to_owned(),
            ..Self::default()
        };

        let mut rest = text;
        while !rest.is_empty() {
            // A fragment without ':' ends the parse.
            let Some((name, after)) = rest.split_once(':') else {
                break;
            };
            let (value, next) = match after.split_once(';') {
                Some((value, next)) => (value, next),
                None => (after, ""),
            };
            id.record(name.trim(), value);
            rest = next;
        }

        id
    }

    /// Parse a Device ID already held as a string.
    pub fn parse_str(raw: &str) -> Self {
        Self::parse(raw.as_bytes())
    }

    fn record(&mut self, name: &str, value: &str) {
        let is = |keys: &[&str]| keys.iter().any(|k| k.eq_ignore_ascii_case(name));

        if self.manufacturer.is_none() && is(MANUFACTURER_KEYS) {
            self.manufacturer = Some(value.to_owned());
        } else if self.model.is_none() && is(MODEL_KEYS) {
            self.model = Some(value.to_owned());
        } else if self.serial.is_none() && is(SERIAL_KEYS) {
            self.serial = Some(value.to_owned());
        }
    }

    /// True when both manufacturer and model are present and non-empty.
    pub fn is_valid(&self) -> bool {
        let present = |f: &Option<String>| f.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.manufacturer) && present(&self.model)
    }

    /// Reject identities that cannot drive an add event.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else if self.full_text.is_empty() {
            Err(PlugwerkError::InvalidDeviceId("missing".into()))
        } else {
            Err(PlugwerkError::InvalidDeviceId(self.full_text.clone()))
        }
    }

    /// Case-insensitive manufacturer and model comparison.
    pub fn same_make_and_model(&self, other: &DeviceIdentity) -> bool {
        let eq = |a: &Option<String>, b: &Option<String>| match (a, b) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        };
        eq(&self.manufacturer, &other.manufacturer) && eq(&self.model, &other.model)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MFG:{} MDL:{} SERN:{}",
            self.manufacturer.as_deref().unwrap_or("-"),
            self.model.as_deref().unwrap_or("-"),
            self.serial.as_deref().unwrap_or("-"),
        )
    }
}
