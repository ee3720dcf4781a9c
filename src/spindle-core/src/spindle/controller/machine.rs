// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Spindle state machine for command sequencing and safety enforcement.
//!
//! This module provides an explicit state machine for the controlled
//! spindle, making transitions clear and keeping the safety guards
//! (speed ceiling, emergency-stop latch) in one place.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::spindle::response::{SpindleError, SpindleResult};
use crate::spindle::state::{CommandedState, Direction, ObservedState, RunState, SpindleSnapshot};

/// Lifecycle state of the controlled spindle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum MachineState {
    /// No serial connection established.
    #[default]
    Offline,
    /// Connected and not rotating.
    Idle,
    /// Rotation commanded; telemetry confirms or corrects it each poll.
    Running,
    /// Latched condition; cleared only by an explicit reset, never by a
    /// status poll.
    EmergencyStop,
    /// Device-reported fault; cleared by a healthy poll or a reset.
    Error,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "Offline"),
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::EmergencyStop => write!(f, "EmergencyStop"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// The spindle state machine.
///
/// Owns both halves of the data model: the commanded state (mutated only
/// through validated commands) and the observed state (mutated only through
/// `observe`/`mark_stale` on the sampler path).
#[derive(Debug, Clone)]
pub struct SpindleStateMachine {
    state: MachineState,
    connected: bool,
    stale: bool,
    commanded: CommandedState,
    observed: ObservedState,
    transition_count: u64,
    last_transition: Option<Instant>,
}

impl Default for SpindleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SpindleStateMachine {
    /// Create a new state machine in the Offline state.
    pub fn new() -> Self {
        Self {
            state: MachineState::Offline,
            connected: false,
            stale: false,
            commanded: CommandedState::default(),
            observed: ObservedState::default(),
            transition_count: 0,
            last_transition: None,
        }
    }

    /// Get the current machine state.
    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Get the last accepted command target.
    pub fn commanded(&self) -> &CommandedState {
        &self.commanded
    }

    /// Get the most recent telemetry sample.
    pub fn observed(&self) -> &ObservedState {
        &self.observed
    }

    /// Get the number of state transitions that have occurred.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Get the time since the last transition.
    pub fn time_in_state(&self) -> Option<Duration> {
        self.last_transition.map(|t| t.elapsed())
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, MachineState::Running)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Run state as presented at the command boundary.
    ///
    /// The emergency latch dominates everything, including staleness: a
    /// spindle assumed to be in emergency stop must never be reported as
    /// merely offline.
    pub fn run_state(&self) -> RunState {
        match self.state {
            MachineState::EmergencyStop => RunState::EmergencyStop,
            _ if !self.connected || self.stale => RunState::Offline,
            MachineState::Error => RunState::Error,
            MachineState::Running => RunState::Running,
            MachineState::Idle => RunState::Stopped,
            MachineState::Offline => RunState::Offline,
        }
    }

    /// Produce the read-only projection published over the watch channel.
    pub fn snapshot(&self, selected_port: Option<String>) -> SpindleSnapshot {
        SpindleSnapshot {
            run_state: self.run_state(),
            commanded: self.commanded,
            observed: self.observed,
            selected_port,
        }
    }

    /// A serial connection was (re)established.
    ///
    /// Telemetry from a previous connection is discarded; the emergency
    /// latch is preserved across reconnects.
    pub fn connection_opened(&mut self) {
        self.connected = true;
        self.stale = false;
        self.observed = ObservedState::default();
        if !matches!(self.state, MachineState::EmergencyStop) {
            self.set_state(MachineState::Idle);
        }
    }

    /// The serial connection was lost or closed.
    pub fn connection_closed(&mut self) {
        self.connected = false;
        self.observed = ObservedState::default();
        if !matches!(self.state, MachineState::EmergencyStop) {
            self.set_state(MachineState::Offline);
        }
    }

    /// Validate and apply a start command.
    ///
    /// Legal only from Idle with a non-zero target; the caller issues the
    /// start and target frames after this succeeds.
    pub fn start(&mut self) -> SpindleResult<()> {
        match self.state {
            MachineState::Idle if self.commanded.target_speed > 0 => {
                self.set_state(MachineState::Running);
                Ok(())
            }
            MachineState::Idle => Err(SpindleError::NoTargetSpeed),
            _ => Err(SpindleError::InvalidTransition {
                command: "start_spindle",
                state: self.run_state(),
            }),
        }
    }

    /// Validate and apply a stop command.
    ///
    /// Returns `Ok(true)` when a stop frame should be issued; stopping an
    /// already idle spindle is a no-op, not an error.
    pub fn stop(&mut self) -> SpindleResult<bool> {
        match self.state {
            MachineState::Running => {
                self.set_state(MachineState::Idle);
                Ok(true)
            }
            MachineState::Idle => Ok(false),
            _ => Err(SpindleError::InvalidTransition {
                command: "stop_spindle",
                state: self.run_state(),
            }),
        }
    }

    /// Latch the emergency stop.
    ///
    /// Legal whenever a connection exists, whatever the current state; the
    /// latch is applied before any frame is sent so a transport failure
    /// still leaves the machine in the safe assumption.
    pub fn emergency_stop(&mut self) -> SpindleResult<()> {
        if !self.connected {
            return Err(SpindleError::NotConnected);
        }
        self.set_state(MachineState::EmergencyStop);
        Ok(())
    }

    /// Validate and store a new target.
    ///
    /// Returns `Ok(true)` when the spindle is running and the target frame
    /// must be re-issued to the device. A rejected target mutates nothing.
    pub fn set_target(&mut self, direction: Direction, speed: u32) -> SpindleResult<bool> {
        if speed > self.commanded.max_speed {
            return Err(SpindleError::OutOfRange {
                speed,
                max: self.commanded.max_speed,
            });
        }
        self.commanded.direction = direction;
        self.commanded.target_speed = speed;
        Ok(self.is_running())
    }

    /// Set the speed ceiling, clamping the stored target down to it.
    ///
    /// Returns `true` when the target was clamped; the caller re-issues the
    /// clamped target while running so the device never keeps a stale
    /// higher setpoint.
    pub fn set_max_speed(&mut self, max: u32) -> bool {
        self.commanded.max_speed = max;
        if self.commanded.target_speed > max {
            self.commanded.target_speed = max;
            true
        } else {
            false
        }
    }

    /// Explicit recovery command clearing the emergency-stop latch or a
    /// fault state. A reset with nothing latched is a no-op.
    pub fn reset(&mut self) -> SpindleResult<()> {
        match self.state {
            MachineState::EmergencyStop | MachineState::Error => {
                let next = if self.connected {
                    MachineState::Idle
                } else {
                    MachineState::Offline
                };
                self.set_state(next);
                Ok(())
            }
            MachineState::Idle | MachineState::Offline => Ok(()),
            MachineState::Running => Err(SpindleError::InvalidTransition {
                command: "reset_spindle",
                state: self.run_state(),
            }),
        }
    }

    /// Apply a decoded telemetry sample.
    ///
    /// The device is authoritative for Running/Idle and can latch the
    /// emergency stop itself; an existing latch is never cleared here. A
    /// fault state clears once a healthy sample arrives.
    pub fn observe(&mut self, sample: ObservedState) {
        self.stale = false;
        self.observed = sample;
        if matches!(self.state, MachineState::EmergencyStop) {
            return;
        }
        match sample.run_state {
            RunState::EmergencyStop => self.set_state(MachineState::EmergencyStop),
            RunState::Error => self.set_state(MachineState::Error),
            RunState::Running => self.set_state(MachineState::Running),
            RunState::Stopped => self.set_state(MachineState::Idle),
            // Offline is a local fallback, never decoded from a frame.
            RunState::Offline => {}
        }
    }

    /// Mark telemetry as stale after repeated poll failures.
    ///
    /// The last sample stays in place but is no longer presented as live.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn set_state(&mut self, state: MachineState) {
        if self.state != state {
            self.state = state;
            self.transition_count += 1;
            self.last_transition = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_sample() -> ObservedState {
        ObservedState {
            run_state: RunState::Running,
            direction: Direction::Forward,
            speed: 950,
            power: 75,
        }
    }

    fn stopped_sample() -> ObservedState {
        ObservedState {
            run_state: RunState::Stopped,
            direction: Direction::Forward,
            speed: 0,
            power: 0,
        }
    }

    fn connected_machine() -> SpindleStateMachine {
        let mut sm = SpindleStateMachine::new();
        sm.connection_opened();
        sm
    }

    #[test]
    fn test_initial_state() {
        let sm = SpindleStateMachine::new();
        assert_eq!(sm.state(), MachineState::Offline);
        assert_eq!(sm.run_state(), RunState::Offline);
    }

    #[test]
    fn test_connection_opened_transitions_to_idle() {
        let sm = connected_machine();
        assert_eq!(sm.state(), MachineState::Idle);
        assert_eq!(sm.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_start_rejected_while_offline() {
        let mut sm = SpindleStateMachine::new();
        assert!(matches!(
            sm.start(),
            Err(SpindleError::InvalidTransition { .. })
        ));
        assert_eq!(sm.state(), MachineState::Offline);
    }

    #[test]
    fn test_start_requires_nonzero_target() {
        let mut sm = connected_machine();
        assert_eq!(sm.start(), Err(SpindleError::NoTargetSpeed));
        assert_eq!(sm.state(), MachineState::Idle);
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let mut sm = connected_machine();
        sm.set_target(Direction::Forward, 1000).unwrap();

        sm.start().unwrap();
        assert_eq!(sm.state(), MachineState::Running);
        assert_eq!(sm.run_state(), RunState::Running);

        // Starting again is not legal from Running.
        assert!(matches!(
            sm.start(),
            Err(SpindleError::InvalidTransition { .. })
        ));

        assert_eq!(sm.stop(), Ok(true));
        assert_eq!(sm.state(), MachineState::Idle);
    }

    #[test]
    fn test_stop_is_idempotent_when_idle() {
        let mut sm = connected_machine();
        assert_eq!(sm.stop(), Ok(false));
        assert_eq!(sm.state(), MachineState::Idle);
    }

    #[test]
    fn test_stop_rejected_while_latched() {
        let mut sm = connected_machine();
        sm.emergency_stop().unwrap();
        assert!(matches!(
            sm.stop(),
            Err(SpindleError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_emergency_stop_requires_connection() {
        let mut sm = SpindleStateMachine::new();
        assert_eq!(sm.emergency_stop(), Err(SpindleError::NotConnected));
    }

    #[test]
    fn test_emergency_stop_latches_until_reset() {
        let mut sm = connected_machine();
        sm.set_target(Direction::Forward, 500).unwrap();
        sm.start().unwrap();
        sm.emergency_stop().unwrap();
        assert_eq!(sm.run_state(), RunState::EmergencyStop);

        // A healthy poll must not clear the latch.
        sm.observe(stopped_sample());
        assert_eq!(sm.run_state(), RunState::EmergencyStop);

        sm.reset().unwrap();
        assert_eq!(sm.state(), MachineState::Idle);
    }

    #[test]
    fn test_device_reported_emergency_latches() {
        let mut sm = connected_machine();
        sm.observe(ObservedState {
            run_state: RunState::EmergencyStop,
            ..stopped_sample()
        });
        assert_eq!(sm.run_state(), RunState::EmergencyStop);

        sm.observe(stopped_sample());
        assert_eq!(sm.run_state(), RunState::EmergencyStop);

        sm.reset().unwrap();
        assert_eq!(sm.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_error_cleared_by_healthy_poll() {
        let mut sm = connected_machine();
        sm.observe(ObservedState {
            run_state: RunState::Error,
            ..stopped_sample()
        });
        assert_eq!(sm.run_state(), RunState::Error);

        sm.observe(running_sample());
        assert_eq!(sm.run_state(), RunState::Running);
    }

    #[test]
    fn test_set_target_out_of_range_mutates_nothing() {
        let mut sm = connected_machine();
        let before = *sm.commanded();
        assert_eq!(
            sm.set_target(Direction::Reverse, before.max_speed + 1),
            Err(SpindleError::OutOfRange {
                speed: before.max_speed + 1,
                max: before.max_speed,
            })
        );
        assert_eq!(*sm.commanded(), before);
    }

    #[test]
    fn test_set_target_reissues_only_while_running() {
        let mut sm = connected_machine();
        assert_eq!(sm.set_target(Direction::Forward, 400), Ok(false));
        sm.start().unwrap();
        assert_eq!(sm.set_target(Direction::Forward, 600), Ok(true));
    }

    #[test]
    fn test_set_max_speed_clamps_target() {
        let mut sm = connected_machine();
        sm.set_max_speed(2000);
        sm.set_target(Direction::Forward, 1000).unwrap();

        assert!(sm.set_max_speed(500));
        assert_eq!(sm.commanded().target_speed, 500);
        assert_eq!(sm.commanded().max_speed, 500);

        // Raising the ceiling leaves the target alone.
        assert!(!sm.set_max_speed(3000));
        assert_eq!(sm.commanded().target_speed, 500);
    }

    #[test]
    fn test_staleness_forces_offline() {
        let mut sm = connected_machine();
        sm.observe(running_sample());
        assert_eq!(sm.run_state(), RunState::Running);

        sm.mark_stale();
        assert_eq!(sm.run_state(), RunState::Offline);

        // A fresh sample brings the live state back.
        sm.observe(running_sample());
        assert_eq!(sm.run_state(), RunState::Running);
    }

    #[test]
    fn test_latch_survives_staleness() {
        let mut sm = connected_machine();
        sm.emergency_stop().unwrap();
        sm.mark_stale();
        assert_eq!(sm.run_state(), RunState::EmergencyStop);
    }

    #[test]
    fn test_connection_closed_goes_offline() {
        let mut sm = connected_machine();
        sm.observe(running_sample());
        sm.connection_closed();
        assert_eq!(sm.run_state(), RunState::Offline);
        assert_eq!(sm.observed().speed, 0);
    }

    #[test]
    fn test_reconnect_preserves_latch() {
        let mut sm = connected_machine();
        sm.emergency_stop().unwrap();
        sm.connection_closed();
        assert_eq!(sm.run_state(), RunState::EmergencyStop);

        sm.connection_opened();
        assert_eq!(sm.run_state(), RunState::EmergencyStop);

        sm.reset().unwrap();
        assert_eq!(sm.run_state(), RunState::Stopped);
    }
}
