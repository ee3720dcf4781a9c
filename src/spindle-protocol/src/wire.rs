// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Frame codec for the spindle controller's ASCII line protocol.
//!
//! Every frame is `;`-prefixed, space-separated and newline-terminated:
//! requests like `;START\n` or `;TARGET F 1000\n`, telemetry like
//! `;RUN F 1000 950 75\n`. Telemetry frames may carry an XOR checksum
//! over the payload as a trailing `*HH` field, which is verified when
//! present. Decoding is all-or-nothing; a structurally invalid frame
//! never yields a partial result.

use thiserror::Error;

use spindle_core::{Direction, RunState};

/// Run state as reported by the device itself.
///
/// `Offline` has no wire representation; it exists only as the host-side
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedState {
    Stopped,
    Running,
    EmergencyStop,
    Error,
}

impl ReportedState {
    pub fn to_run_state(self) -> RunState {
        match self {
            ReportedState::Stopped => RunState::Stopped,
            ReportedState::Running => RunState::Running,
            ReportedState::EmergencyStop => RunState::EmergencyStop,
            ReportedState::Error => RunState::Error,
        }
    }
}

/// One decoded telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTelemetry {
    pub state: ReportedState,
    pub direction: Direction,
    /// Target speed echoed back by the device, RPM.
    pub target_speed: u32,
    /// Measured speed, RPM.
    pub speed: u32,
    /// Output power, percent.
    pub power: u8,
}

/// Error type for telemetry frame decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("status frame is not properly delimited")]
    Truncated,

    #[error("status frame checksum mismatch (computed {computed:02X}, frame carries {found:02X})")]
    ChecksumMismatch { computed: u8, found: u8 },

    #[error("malformed status frame: {0}")]
    Malformed(String),
}

/// Encode a start request.
pub fn encode_start() -> Vec<u8> {
    b";START\n".to_vec()
}

/// Encode a stop request.
pub fn encode_stop() -> Vec<u8> {
    b";STOP\n".to_vec()
}

/// Encode an emergency-stop request.
pub fn encode_emergency_stop() -> Vec<u8> {
    b";EMERG\n".to_vec()
}

/// Encode a target request with direction and speed in RPM.
pub fn encode_set_target(direction: Direction, speed: u32) -> Vec<u8> {
    format!(";TARGET {} {}\n", direction_token(direction), speed).into_bytes()
}

/// Encode a status query.
pub fn encode_query_status() -> Vec<u8> {
    b";STATUS\n".to_vec()
}

/// Encode a telemetry frame, optionally with the `*HH` checksum field.
///
/// This is the inverse of `decode_status_frame`; the mock device and the
/// codec tests rely on the pair round-tripping.
pub fn encode_status_frame(telemetry: &RawTelemetry, with_checksum: bool) -> Vec<u8> {
    let payload = format!(
        "{} {} {} {} {}",
        state_token(telemetry.state),
        direction_token(telemetry.direction),
        telemetry.target_speed,
        telemetry.speed,
        telemetry.power,
    );
    if with_checksum {
        let sum = xor_checksum(payload.as_bytes());
        format!(";{}*{:02X}\n", payload, sum).into_bytes()
    } else {
        format!(";{}\n", payload).into_bytes()
    }
}

/// Decode one telemetry frame.
pub fn decode_status_frame(frame: &[u8]) -> Result<RawTelemetry, DecodeError> {
    let text = std::str::from_utf8(frame)
        .map_err(|_| DecodeError::Malformed("frame is not valid ASCII".into()))?;

    let Some(body) = text.strip_prefix(';') else {
        return Err(DecodeError::Truncated);
    };
    let Some(body) = body.strip_suffix('\n') else {
        return Err(DecodeError::Truncated);
    };
    let body = body.strip_suffix('\r').unwrap_or(body);

    let payload = match body.rsplit_once('*') {
        Some((payload, sum_field)) => {
            let found = u8::from_str_radix(sum_field, 16)
                .map_err(|_| DecodeError::Malformed(format!("invalid checksum field '{sum_field}'")))?;
            let computed = xor_checksum(payload.as_bytes());
            if computed != found {
                return Err(DecodeError::ChecksumMismatch { computed, found });
            }
            payload
        }
        None => body,
    };

    let fields: Vec<&str> = payload.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(DecodeError::Malformed(format!(
            "expected 5 fields, got {}",
            fields.len()
        )));
    }

    let state = match fields[0] {
        "STOP" => ReportedState::Stopped,
        "RUN" => ReportedState::Running,
        "EMERG" => ReportedState::EmergencyStop,
        "ERROR" => ReportedState::Error,
        other => {
            return Err(DecodeError::Malformed(format!(
                "unknown state token '{other}'"
            )))
        }
    };

    let direction = match fields[1] {
        "F" => Direction::Forward,
        "R" => Direction::Reverse,
        other => {
            return Err(DecodeError::Malformed(format!(
                "unknown direction token '{other}'"
            )))
        }
    };

    let target_speed = parse_rpm(fields[2], "target speed")?;
    let speed = parse_rpm(fields[3], "speed")?;

    let power = fields[4]
        .parse::<u8>()
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| DecodeError::Malformed(format!("power '{}' out of range", fields[4])))?;

    Ok(RawTelemetry {
        state,
        direction,
        target_speed,
        speed,
        power,
    })
}

fn parse_rpm(field: &str, what: &str) -> Result<u32, DecodeError> {
    field
        .parse::<u32>()
        .map_err(|_| DecodeError::Malformed(format!("invalid {what} '{field}'")))
}

fn state_token(state: ReportedState) -> &'static str {
    match state {
        ReportedState::Stopped => "STOP",
        ReportedState::Running => "RUN",
        ReportedState::EmergencyStop => "EMERG",
        ReportedState::Error => "ERROR",
    }
}

fn direction_token(direction: Direction) -> &'static str {
    match direction {
        Direction::Forward => "F",
        Direction::Reverse => "R",
    }
}

fn xor_checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}
