// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

/// Speed ceiling (RPM) applied until a configured or persisted value loads.
pub const DEFAULT_MAX_SPEED: u32 = 1_000;

/// Rotation direction of the spindle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    pub fn from_reverse(reverse: bool) -> Self {
        if reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        }
    }

    pub fn is_reverse(self) -> bool {
        matches!(self, Direction::Reverse)
    }
}

/// Run state as presented at the command boundary.
///
/// `Offline` is a local fallback for a missing connection or stale
/// telemetry; the device itself never reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Stopped,
    Running,
    EmergencyStop,
    Error,
    Offline,
}

/// The last accepted target, mutated only on the validated command path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandedState {
    pub direction: Direction,
    /// Requested rotational speed in RPM.
    pub target_speed: u32,
    /// Configured ceiling in RPM; accepted targets never exceed it.
    pub max_speed: u32,
}

impl Default for CommandedState {
    fn default() -> Self {
        Self {
            direction: Direction::Forward,
            target_speed: 0,
            max_speed: DEFAULT_MAX_SPEED,
        }
    }
}

/// The most recent telemetry snapshot, mutated only by the status sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub run_state: RunState,
    pub direction: Direction,
    /// Measured rotational speed in RPM.
    pub speed: u32,
    /// Output power in percent (0-100).
    pub power: u8,
}

impl Default for ObservedState {
    fn default() -> Self {
        Self {
            run_state: RunState::Offline,
            direction: Direction::Forward,
            speed: 0,
            power: 0,
        }
    }
}

/// Read-only projection of spindle state shared over the watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpindleSnapshot {
    /// Effective boundary-visible run state (emergency latch and staleness
    /// already folded in by the state machine).
    pub run_state: RunState,
    pub commanded: CommandedState,
    pub observed: ObservedState,
    pub selected_port: Option<String>,
}

impl Default for SpindleSnapshot {
    fn default() -> Self {
        Self {
            run_state: RunState::Offline,
            commanded: CommandedState::default(),
            observed: ObservedState::default(),
            selected_port: None,
        }
    }
}

impl SpindleSnapshot {
    /// Build the boundary DTO consumed by `get_spindle_state`.
    ///
    /// Measured readings are zeroed while offline so stale samples are
    /// never presented as live; the commanded target is not telemetry and
    /// survives.
    pub fn to_dto(&self) -> SpindleStateDto {
        let state = self.run_state;
        let offline = state == RunState::Offline;
        SpindleStateDto {
            state,
            direction: if offline {
                false
            } else {
                self.observed.direction.is_reverse()
            },
            target_speed: self.commanded.target_speed,
            speed: if offline { 0 } else { self.observed.speed },
            power: if offline { 0 } else { self.observed.power },
        }
    }
}

/// Wire shape of `get_spindle_state`, preserved field-for-field from the
/// original control panel (`Direction: true` means reverse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpindleStateDto {
    pub state: RunState,
    pub direction: bool,
    pub target_speed: u32,
    pub speed: u32,
    pub power: u8,
}
