// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Spindle controller components.
//!
//! The state machine sequences commands and enforces the safety guards;
//! the policies configure polling cadence and retry behavior.

pub mod machine;
pub mod policies;

pub use machine::{MachineState, SpindleStateMachine};
pub use policies::{AdaptivePolling, ExponentialBackoff, FixedPolling, PollingPolicy, RetryPolicy};
