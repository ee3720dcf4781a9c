// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport DTOs for the JSON line protocol.
//!
//! Command names and the `get_spindle_state` shape are preserved exactly
//! as the original control panel consumed them.

use serde::{Deserialize, Serialize};

use spindle_core::SpindleStateDto;

/// Command received from control-panel clients (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientCommand {
    GetAvailablePorts,
    GetSelectedPort,
    SetPort { path: String },
    GetSpindleState,
    StartSpindle,
    StopSpindle,
    EmergencyStop,
    SetSpindleTarget { direction: bool, speed: u32 },
    GetMaxSpindleSpeed,
    SetMaxSpindleSpeed { speed: u32 },
    ResetSpindle,
}

/// Response sent to control-panel clients over TCP.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClientResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SpindleStateDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
