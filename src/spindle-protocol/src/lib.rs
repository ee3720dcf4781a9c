// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Protocol layers for spindle-rs.
//!
//! `wire` is the device-facing frame codec; `types`/`codec`/`mapping` make
//! up the JSON line protocol spoken by control-panel clients.

pub mod codec;
pub mod mapping;
pub mod types;
pub mod wire;

pub use types::{ClientCommand, ClientResponse};
pub use wire::{DecodeError, RawTelemetry, ReportedState};
