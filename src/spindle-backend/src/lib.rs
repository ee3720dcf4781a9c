// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport layer for spindle-rs.
//!
//! Owns the single serial connection to the spindle controller. `Transport`
//! is the byte-level contract, `SerialTransport` the real implementation,
//! `MockTransport` an in-memory substitute, and `SpindleLink` the typed
//! request layer the spindle task talks to.

pub mod link;
pub mod mock;
pub mod serial;
pub mod transport;

pub use link::SpindleLink;
pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use transport::{ConnectError, PortDescriptor, Transport, TransportError};
