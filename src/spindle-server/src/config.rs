// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for spindle-server.
//!
//! Config is loaded from the `[spindle-server]` section of `spindle-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./spindle-rs.toml`
//! 3. `~/.config/spindle-rs/spindle-rs.toml`
//! 4. `/etc/spindle-rs/spindle-rs.toml`

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use spindle_app::ConfigFile;
use spindle_backend::serial::{DEFAULT_BAUD, DEFAULT_USB_VID};
use spindle_core::DEFAULT_MAX_SPEED;

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Spindle controller connection and limits
    pub spindle: SpindleConfig,
    /// Polling, timeout and retry behavior
    pub behavior: BehaviorConfig,
    /// TCP listener configuration
    pub listen: ListenConfig,
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "spindle-server"
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// State file carrying the max speed across restarts; disabled when
    /// unset.
    pub state_file: Option<PathBuf>,
}

/// Spindle controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpindleConfig {
    /// Serial port to open at startup (e.g. "/dev/ttyACM0"); ports can
    /// also be selected at runtime via `set_port`.
    pub port: Option<String>,
    /// Baud rate of the controller interface
    pub baud: u32,
    /// USB vendor id used to filter port enumeration
    /// (1155 = 0x0483, STMicroelectronics); 0 disables the filter.
    pub usb_vid: u16,
    /// Maximum spindle speed in RPM until a persisted value overrides it
    pub max_speed: u32,
}

impl Default for SpindleConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: DEFAULT_BAUD,
            usb_vid: DEFAULT_USB_VID,
            max_speed: DEFAULT_MAX_SPEED,
        }
    }
}

/// Behavior configuration for status polling and retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Status poll interval in milliseconds while idle
    pub poll_interval_ms: u64,
    /// Status poll interval in milliseconds while running
    pub poll_interval_running_ms: u64,
    /// Bound on waiting for one telemetry frame, milliseconds
    pub receive_timeout_ms: u64,
    /// Consecutive poll failures before the state degrades to Offline
    pub offline_threshold: u32,
    /// Maximum attempts when opening the startup port
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds
    pub retry_base_delay_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            poll_interval_running_ms: 250,
            receive_timeout_ms: 200,
            offline_threshold: 3,
            max_retries: 3,
            retry_base_delay_ms: 100,
        }
    }
}

/// TCP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// IP address for the JSON TCP listener
    pub ip: IpAddr,
    /// Port for the JSON TCP listener
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 7878,
        }
    }
}
