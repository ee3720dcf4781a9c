// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod handle;
mod listener;
mod persist;
mod spindle_task;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use spindle_app::{init_logging, ConfigFile};
use spindle_backend::{SerialTransport, SpindleLink};
use spindle_core::spindle::controller::{AdaptivePolling, ExponentialBackoff};
use spindle_core::{DynResult, SpindleSnapshot};

use config::ServerConfig;
use handle::SpindleHandle;
use spindle_task::SpindleTaskConfig;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - spindle control daemon");
const SPINDLE_TASK_CHANNEL_BUFFER: usize = 32;
const ESTOP_CHANNEL_BUFFER: usize = 4;
const RETRY_MAX_DELAY_SECS: u64 = 2;

#[derive(Debug, Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Serial port of the spindle controller (e.g. /dev/ttyACM0)
    #[arg(short = 'p', long = "port")]
    port: Option<String>,
    /// Baud rate of the controller interface
    #[arg(short = 'b', long = "baud")]
    baud: Option<u32>,
    /// IP address for the JSON TCP listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the JSON TCP listener
    #[arg(short = 'P', long = "listen-port")]
    listen_port: Option<u16>,
    /// Maximum spindle speed in RPM (overrides config and state file)
    #[arg(long = "max-speed")]
    max_speed: Option<u32>,
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    let (cfg, cfg_path) = match cli.config.as_deref() {
        Some(path) => (ServerConfig::load_from_file(path)?, Some(path.to_path_buf())),
        None => ServerConfig::load_from_default_paths()?,
    };
    init_logging(cfg.general.log_level.as_deref());
    if let Some(path) = cfg_path {
        info!("Loaded configuration from {}", path.display());
    }

    let serial_port = cli.port.or_else(|| cfg.spindle.port.clone());
    let baud = cli.baud.unwrap_or(cfg.spindle.baud);
    let usb_vid = Some(cfg.spindle.usb_vid).filter(|vid| *vid != 0);
    let listen_addr = SocketAddr::new(
        cli.listen.unwrap_or(cfg.listen.ip),
        cli.listen_port.unwrap_or(cfg.listen.port),
    );

    match serial_port.as_deref() {
        Some(port) => info!("Spindle controller on {} @ {} baud", port, baud),
        None => info!("No startup port configured; waiting for set_port"),
    }

    let transport = SerialTransport::new(baud, usb_vid);
    let link = SpindleLink::new(
        Box::new(transport),
        Duration::from_millis(cfg.behavior.receive_timeout_ms),
    );

    let task_config = SpindleTaskConfig {
        polling: Box::new(AdaptivePolling::new(
            Duration::from_millis(cfg.behavior.poll_interval_ms),
            Duration::from_millis(cfg.behavior.poll_interval_running_ms),
        )),
        retry: Box::new(ExponentialBackoff::new(
            cfg.behavior.max_retries,
            Duration::from_millis(cfg.behavior.retry_base_delay_ms),
            Duration::from_secs(RETRY_MAX_DELAY_SECS),
        )),
        offline_threshold: cfg.behavior.offline_threshold,
        initial_max_speed: cli.max_speed.unwrap_or(cfg.spindle.max_speed),
        initial_port: serial_port,
        state_file: if cli.max_speed.is_some() {
            // An explicit CLI ceiling wins over any persisted value.
            None
        } else {
            cfg.general.state_file.clone()
        },
    };

    let (cmd_tx, cmd_rx) = mpsc::channel(SPINDLE_TASK_CHANNEL_BUFFER);
    let (estop_tx, estop_rx) = mpsc::channel(ESTOP_CHANNEL_BUFFER);
    let (state_tx, state_rx) = watch::channel(SpindleSnapshot::default());

    let mut task = tokio::spawn(spindle_task::run_spindle_task(
        link,
        task_config,
        cmd_rx,
        estop_rx,
        state_tx,
    ));

    let spindle_handle = SpindleHandle {
        cmd_tx,
        estop_tx,
        state_rx,
    };
    let mut listener = tokio::spawn(listener::run_listener(listen_addr, spindle_handle));

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut task => {
            error!("Spindle task exited: {:?}", result);
        }
        result = &mut listener => {
            error!("Listener exited: {:?}", result);
        }
    }

    task.abort();
    listener.abort();
    Ok(())
}
