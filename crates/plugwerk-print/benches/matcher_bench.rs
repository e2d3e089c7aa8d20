// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for device-URI selection and queue matching in the
// plugwerk-print crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use plugwerk_core::device_id::DeviceIdentity;
use plugwerk_core::types::{DeviceUriList, ObservedDevice, Queue, QueueState, ServerDevice};
use plugwerk_print::{QueueFilter, select_device_uris};

// ---------------------------------------------------------------------------
// Helper: a discovery result the size of a busy print server
// ---------------------------------------------------------------------------

/// `count` devices over a handful of models and schemes; the observed device
/// is one of them.
fn synthetic_devices(count: usize) -> Vec<ServerDevice> {
    let schemes = ["usb", "hp", "hpfax", "serial"];
    (0..count)
        .map(|i| {
            let scheme = schemes[i % schemes.len()];
            let model = i % 7;
            ServerDevice {
                device_uri: format!("{scheme}://Acme/Model%20{model}?serial=SN{i:05}"),
                device_id: Some(format!("MFG:Acme;MDL:Model {model};SN:SN{i:05};")),
            }
        })
        .collect()
}

fn observed() -> ObservedDevice {
    ObservedDevice {
        stable_devpath: "/devices/pci0000:00/usb1/1-2".into(),
        identity: DeviceIdentity::parse_str("MFG:Acme;MDL:Model 3;"),
        usb_serial: "SN00500".into(),
        usblp_index: Some(0),
    }
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Benchmark selecting the observed device's URIs from 1000 discovered
/// devices, including twin expansion.
fn bench_select_device_uris(c: &mut Criterion) {
    let devices = synthetic_devices(1000);
    let observed = observed();
    let prefs = vec!["hp".to_string(), "usb".to_string()];

    c.bench_function("select_device_uris (1000 devices)", |b| {
        b.iter(|| {
            let uris = select_device_uris(black_box(&observed), black_box(&devices), &prefs);
            assert!(!uris.is_empty());
        });
    });
}

/// Benchmark matching 500 queues against a device's URIs with normalized
/// comparison and the usblp rule.
fn bench_queue_filter(c: &mut Criterion) {
    let queues: Vec<Queue> = synthetic_devices(500)
        .into_iter()
        .map(|d| Queue {
            printer_uri: format!("ipp://localhost/printers/{}", d.device_uri.len()),
            device_uri: d.device_uri,
            state: QueueState::Stopped,
            state_message: "Unplugged or turned off".into(),
        })
        .collect();
    let uris: DeviceUriList = ["usb://Acme/Model%203?serial=SN00500", "hp://Acme/Model_3?serial=SN00500"]
        .into_iter()
        .collect();
    let filter = QueueFilter {
        uris: &uris,
        usblp_index: Some(0),
        only_disabled: true,
    };

    c.bench_function("queue_filter (500 queues)", |b| {
        b.iter(|| black_box(queues.iter().filter(|q| filter.matches(q)).count()));
    });
}

criterion_group!(benches, bench_select_device_uris, bench_queue_filter);
criterion_main!(benches);
