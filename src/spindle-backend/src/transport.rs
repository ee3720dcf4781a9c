// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

/// Identifies one enumerable serial device.
///
/// Descriptors are produced fresh on every enumeration; nothing beyond the
/// path string persists between enumerations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub path: String,
}

/// Error type for transport operations on an open connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),

    #[error("no serial port selected")]
    NotConnected,

    #[error("a frame exchange is already in flight")]
    Busy,

    #[error("serial I/O error: {0}")]
    Io(String),

    #[error("no response from device within {0:?}")]
    Timeout(Duration),
}

/// Error type for opening a port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("port {0} is not attached")]
    NotFound(String),

    #[error("port {0} is busy")]
    Busy(String),

    #[error("failed to open port {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Alias to reduce type complexity in Transport.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ConnectError>> + Send + 'a>>;

/// Contract for the single owned serial connection.
///
/// Implementations serialize all wire traffic: at most one frame is in
/// flight, and a second send/receive while one is pending fails fast with
/// `Busy` instead of queuing silently.
pub trait Transport: Send {
    /// List currently attached serial devices.
    ///
    /// An empty list is not an error; only an OS-level enumeration failure
    /// is.
    fn enumerate(&self) -> Result<Vec<PortDescriptor>, TransportError>;

    /// Close any existing connection and open the named port with the
    /// device's fixed framing parameters.
    ///
    /// Opening may reset the controller's internal buffers; commands queued
    /// before a reselect do not survive it.
    fn select<'a>(&'a mut self, path: &'a str) -> ConnectFuture<'a>;

    /// Path of the currently open port, if any.
    fn current_selection(&self) -> Option<&str>;

    /// Drop the current connection.
    fn disconnect(&mut self);

    /// Write one frame to the device.
    fn send<'a>(&'a mut self, frame: &'a [u8]) -> TransportFuture<'a, ()>;

    /// Read one newline-terminated frame, waiting at most `timeout`.
    fn receive(&mut self, timeout: Duration) -> TransportFuture<'_, Vec<u8>>;
}
