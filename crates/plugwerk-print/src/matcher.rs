// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device-URI matcher.
//
// Works out which of the device URIs the print server knows about name the
// printer that was just attached.  Candidates must come from a preferred
// backend and report a Device ID with the same manufacturer and model; the
// serial number then decides between identical models.  Sibling functions of
// a multi-function device (same address, different scheme) are pulled in
// afterwards.

use tracing::{debug, info, instrument};

use plugwerk_core::config::HotplugConfig;
use plugwerk_core::device_id::DeviceIdentity;
use plugwerk_core::error::Result;
use plugwerk_core::types::{DeviceUriList, ObservedDevice, ServerDevice};
use plugwerk_core::uri;

use crate::server::PrintServer;
use crate::uri_map::UriMap;

/// How a candidate relates to the observed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateMatch {
    /// Same make and model, and the serial numbers agree.
    Serial,
    /// Same make and model; the device reports no serial to compare.
    NoSerial,
    /// Not this device.
    Rejected,
}

/// Compare one discovered device against the observed one.
pub fn classify_candidate(
    observed: &ObservedDevice,
    device_uri: &str,
    reported: &DeviceIdentity,
) -> CandidateMatch {
    let ours = &observed.identity;
    if !ours.same_make_and_model(reported) {
        return CandidateMatch::Rejected;
    }

    if let (Some(our_serial), Some(their_serial)) = (&ours.serial, &reported.serial) {
        return if our_serial == their_serial {
            CandidateMatch::Serial
        } else {
            CandidateMatch::Rejected
        };
    }

    let usb_serial = observed.usb_serial.as_str();
    if !usb_serial.is_empty()
        && (reported.serial.as_deref() == Some(usb_serial)
            || uri::contains_serial_token(device_uri, usb_serial))
    {
        return CandidateMatch::Serial;
    }

    if ours.serial.is_none() {
        CandidateMatch::NoSerial
    } else {
        CandidateMatch::Rejected
    }
}

/// Pick the device URIs naming the observed device out of a discovery result.
///
/// Serial matches win; without any, every make-and-model match with no
/// serial to tell them apart is returned.  Twins of the accepted URIs from
/// the full discovery result are appended.
pub fn select_device_uris(
    observed: &ObservedDevice,
    devices: &[ServerDevice],
    preferred_schemes: &[String],
) -> DeviceUriList {
    let mut serial = DeviceUriList::new();
    let mut no_serial = DeviceUriList::new();

    for device in devices {
        if !uri::is_preferred_scheme(&device.device_uri, preferred_schemes) {
            continue;
        }
        let Some(raw_id) = device.device_id.as_deref() else {
            continue;
        };
        let reported = DeviceIdentity::parse_str(raw_id);

        match classify_candidate(observed, &device.device_uri, &reported) {
            CandidateMatch::Serial => {
                debug!(uri = %device.device_uri, "serial match");
                serial.push(device.device_uri.as_str());
            }
            CandidateMatch::NoSerial => {
                debug!(uri = %device.device_uri, "make and model match without serial");
                no_serial.push(device.device_uri.as_str());
            }
            CandidateMatch::Rejected => {}
        }
    }

    let accepted = if serial.is_empty() { no_serial } else { serial };
    let mut result = accepted.clone();
    for accepted_uri in &accepted {
        for device in devices {
            if uri::is_loose_twin(accepted_uri, &device.device_uri)
                && result.push(device.device_uri.as_str())
            {
                debug!(uri = %device.device_uri, twin_of = %accepted_uri, "adding twin URI");
            }
        }
    }
    result
}

/// Find the server's device URIs for `observed` and record them in `map`.
///
/// An empty list means the server does not know the device; the map is then
/// left untouched.
#[instrument(skip_all, fields(devpath = %observed.stable_devpath))]
pub async fn find_matching_device_uris<S: PrintServer>(
    server: &S,
    config: &HotplugConfig,
    observed: &ObservedDevice,
    mut map: UriMap,
) -> Result<DeviceUriList> {
    if !config.settle_delay().is_zero() {
        tokio::time::sleep(config.settle_delay()).await;
    }

    let devices: Vec<ServerDevice> = server
        .list_devices(&config.excluded_schemes)
        .await?
        .into_iter()
        .filter(|d| {
            !uri::scheme(&d.device_uri)
                .is_some_and(|s| config.excluded_schemes.iter().any(|x| x == s))
        })
        .collect();
    debug!(count = devices.len(), "devices discovered");

    let uris = select_device_uris(observed, &devices, &config.preferred_schemes);
    if uris.is_empty() {
        info!(identity = %observed.identity, "no matching device URIs");
        return Ok(uris);
    }

    info!(uris = %uris, "matching device URIs");
    map.insert_or_replace(observed.stable_devpath.as_str(), uris.clone());
    map.commit()?;
    Ok(uris)
}
