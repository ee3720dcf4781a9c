// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Typed request layer between the spindle task and the transport.
//!
//! `SpindleLink` turns transport bytes into the operations the task
//! reasons about. Commands are write-only on the wire; the status query is
//! the only request/response exchange, and only one is in flight at a time.

use std::time::Duration;

use spindle_core::{Direction, SpindleError, SpindleResult};
use spindle_protocol::wire::{self, RawTelemetry};

use crate::transport::{ConnectError, PortDescriptor, Transport, TransportError};

pub struct SpindleLink {
    transport: Box<dyn Transport>,
    receive_timeout: Duration,
}

impl SpindleLink {
    pub fn new(transport: Box<dyn Transport>, receive_timeout: Duration) -> Self {
        Self {
            transport,
            receive_timeout,
        }
    }

    pub fn enumerate(&self) -> Result<Vec<PortDescriptor>, TransportError> {
        self.transport.enumerate()
    }

    pub async fn select(&mut self, path: &str) -> Result<(), ConnectError> {
        self.transport.select(path).await
    }

    pub fn current_selection(&self) -> Option<&str> {
        self.transport.current_selection()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.current_selection().is_some()
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    pub async fn start(&mut self) -> SpindleResult<()> {
        self.send(wire::encode_start()).await
    }

    pub async fn stop(&mut self) -> SpindleResult<()> {
        self.send(wire::encode_stop()).await
    }

    pub async fn emergency_stop(&mut self) -> SpindleResult<()> {
        self.send(wire::encode_emergency_stop()).await
    }

    pub async fn set_target(&mut self, direction: Direction, speed: u32) -> SpindleResult<()> {
        self.send(wire::encode_set_target(direction, speed)).await
    }

    /// Issue a status query and decode the device's answer.
    pub async fn query_status(&mut self) -> SpindleResult<RawTelemetry> {
        self.send(wire::encode_query_status()).await?;
        let frame = self
            .transport
            .receive(self.receive_timeout)
            .await
            .map_err(map_transport_error)?;
        wire::decode_status_frame(&frame).map_err(|e| SpindleError::Communication(e.to_string()))
    }

    async fn send(&mut self, frame: Vec<u8>) -> SpindleResult<()> {
        self.transport
            .send(&frame)
            .await
            .map_err(map_transport_error)
    }
}

fn map_transport_error(error: TransportError) -> SpindleError {
    match error {
        TransportError::NotConnected => SpindleError::NotConnected,
        TransportError::Timeout(_) => SpindleError::Timeout,
        other => SpindleError::Communication(other.to_string()),
    }
}
