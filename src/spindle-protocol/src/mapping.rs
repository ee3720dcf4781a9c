// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Mapping between client protocol commands and spindle task commands.

use spindle_core::{Direction, SpindleCommand};

use crate::types::ClientCommand;

/// Translate a client command into the task-internal command.
///
/// The read-only accessors all resolve to a snapshot request; the listener
/// picks the field the client asked for out of the reply.
pub fn client_command_to_spindle(cmd: ClientCommand) -> SpindleCommand {
    match cmd {
        ClientCommand::GetAvailablePorts => SpindleCommand::GetAvailablePorts,
        ClientCommand::GetSelectedPort
        | ClientCommand::GetSpindleState
        | ClientCommand::GetMaxSpindleSpeed => SpindleCommand::GetSnapshot,
        ClientCommand::SetPort { path } => SpindleCommand::SetPort(path),
        ClientCommand::StartSpindle => SpindleCommand::Start,
        ClientCommand::StopSpindle => SpindleCommand::Stop,
        ClientCommand::EmergencyStop => SpindleCommand::EmergencyStop,
        ClientCommand::SetSpindleTarget { direction, speed } => SpindleCommand::SetTarget {
            direction: Direction::from_reverse(direction),
            speed,
        },
        ClientCommand::SetMaxSpindleSpeed { speed } => SpindleCommand::SetMaxSpeed(speed),
        ClientCommand::ResetSpindle => SpindleCommand::Reset,
    }
}
