// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::Serialize;
use thiserror::Error;

use crate::spindle::state::RunState;

/// Error type returned by spindle requests.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
pub enum SpindleError {
    #[error("{command} is not allowed while the spindle is {state:?}")]
    InvalidTransition {
        command: &'static str,
        state: RunState,
    },

    #[error("target speed {speed} RPM exceeds the configured maximum of {max} RPM")]
    OutOfRange { speed: u32, max: u32 },

    #[error("cannot start with a target speed of 0 RPM")]
    NoTargetSpeed,

    #[error("no serial port selected")]
    NotConnected,

    #[error("failed to open serial port {path}: {reason}")]
    Connect { path: String, reason: String },

    #[error("device communication failed: {0}")]
    Communication(String),

    #[error("device did not respond within the receive timeout")]
    Timeout,
}

impl SpindleError {
    /// Transient errors are worth retrying; state and validation errors
    /// are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SpindleError::Communication(_) | SpindleError::Timeout | SpindleError::Connect { .. }
        )
    }
}

pub type SpindleResult<T> = Result<T, SpindleError>;
