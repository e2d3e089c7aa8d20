// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugwerk: hotplug callout that reattaches USB and Bluetooth printers to
// their existing CUPS queues.
//
// Entry point.  Parses the command line, initialises logging and
// configuration, and runs one add or remove event.
//
//     plugwerk add <devpath | bluetooth-address>
//     plugwerk remove <devpath | bluetooth-address>

mod handler;
mod helper;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use plugwerk_core::config::HotplugConfig;
use plugwerk_core::error::PlugwerkError;
use plugwerk_device::{BluetoothHelper, DeviceIdAcquirer, NusbTransport, Sysfs};
use plugwerk_print::CupsClient;

use handler::EventHandler;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: $PLUGWERK_CONFIG, then /etc/plugwerk/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Do not retry connecting to the print server
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// A printer was attached
    Add {
        /// Device path (e.g. /devices/pci0000:00/.../usb1/1-2) or Bluetooth address
        device: String,
    },
    /// A printer was detached
    Remove {
        /// Device path or Bluetooth address
        device: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match HotplugConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };
    if cli.fail_fast {
        config.connect_retries = 0;
    }

    let acquirer = DeviceIdAcquirer::new(
        Sysfs::new(&config.sysfs_root),
        NusbTransport::new(config.usb_timeout()),
        BluetoothHelper::new(&config.bluetooth_helper, config.usb_timeout()),
    );
    let mut events = EventHandler::new(&config, acquirer);
    let connect = || CupsClient::connect(&config);

    let result = match &cli.command {
        Command::Add { device } => events
            .add(device, connect)
            .await
            .map(|outcome| info!(%outcome, "add event handled")),
        Command::Remove { device } => events
            .remove(device, connect)
            .await
            .map(|outcome| info!(%outcome, "remove event handled")),
    };
    events.finish().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "event failed");
            exit_code(&e)
        }
    }
}

/// Only failing to see the device at all is a setup failure; everything else
/// ends this event and is left to the next one.
fn exit_code(err: &PlugwerkError) -> ExitCode {
    match err {
        PlugwerkError::DeviceEnumeration(_) | PlugwerkError::Config(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}
