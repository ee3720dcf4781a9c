// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Mock transport for development and testing.
//!
//! Holds everything in memory and needs no hardware. Two reply modes:
//! scripted (tests push frames or failures onto a queue) and device
//! simulation (sent frames drive a tiny in-memory spindle that answers
//! status queries like the real controller would).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use spindle_core::Direction;
use spindle_protocol::wire::{self, RawTelemetry, ReportedState};

use crate::transport::{
    ConnectError, ConnectFuture, PortDescriptor, Transport, TransportError, TransportFuture,
};

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared handle over the frames a `MockTransport` has sent.
#[derive(Clone, Default)]
pub struct SentFrames(Arc<Mutex<Vec<Vec<u8>>>>);

impl SentFrames {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        lock_unpoisoned(&self.0).clone()
    }

    /// Frames as text, convenient for assertions on the line protocol.
    pub fn as_strings(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }
}

/// Shared handle over the scripted reply queue of a `MockTransport`.
#[derive(Clone, Default)]
pub struct ReplyQueue(Arc<Mutex<VecDeque<Result<Vec<u8>, TransportError>>>>);

impl ReplyQueue {
    pub fn push_frame(&self, frame: Vec<u8>) {
        lock_unpoisoned(&self.0).push_back(Ok(frame));
    }

    pub fn push_status(&self, telemetry: &RawTelemetry) {
        self.push_frame(wire::encode_status_frame(telemetry, false));
    }

    pub fn push_error(&self, error: TransportError) {
        lock_unpoisoned(&self.0).push_back(Err(error));
    }

    fn pop(&self) -> Option<Result<Vec<u8>, TransportError>> {
        lock_unpoisoned(&self.0).pop_front()
    }
}

/// Minimal in-memory spindle used by the device-simulation mode.
///
/// Spin-up is instantaneous and the emergency latch behaves like the real
/// controller's: once set it stays set.
#[derive(Debug, Default)]
struct DeviceSim {
    running: bool,
    emergency: bool,
    direction: Direction,
    target_speed: u32,
}

impl DeviceSim {
    fn apply(&mut self, frame: &[u8]) -> Option<RawTelemetry> {
        let text = String::from_utf8_lossy(frame);
        let body = text.trim_end_matches(['\r', '\n']);
        let body = body.strip_prefix(';').unwrap_or(body);
        let fields: Vec<&str> = body.split_whitespace().collect();
        match fields.first().copied() {
            Some("START") => {
                if !self.emergency {
                    self.running = true;
                }
                None
            }
            Some("STOP") => {
                self.running = false;
                None
            }
            Some("EMERG") => {
                self.emergency = true;
                self.running = false;
                None
            }
            Some("TARGET") => {
                if let (Some(dir), Some(speed)) = (fields.get(1), fields.get(2)) {
                    self.direction = if *dir == "R" {
                        Direction::Reverse
                    } else {
                        Direction::Forward
                    };
                    self.target_speed = speed.parse().unwrap_or(self.target_speed);
                }
                None
            }
            Some("STATUS") => Some(self.status()),
            _ => None,
        }
    }

    fn status(&self) -> RawTelemetry {
        let state = if self.emergency {
            ReportedState::EmergencyStop
        } else if self.running {
            ReportedState::Running
        } else {
            ReportedState::Stopped
        };
        RawTelemetry {
            state,
            direction: self.direction,
            target_speed: self.target_speed,
            speed: if self.running { self.target_speed } else { 0 },
            power: if self.running { 75 } else { 0 },
        }
    }
}

/// In-memory transport implementing the same contract as `SerialTransport`.
pub struct MockTransport {
    ports: Vec<String>,
    selection: Option<String>,
    sent: SentFrames,
    replies: ReplyQueue,
    device: Option<DeviceSim>,
}

impl MockTransport {
    /// Scripted mock: every receive pops the reply queue, or times out
    /// when it is empty.
    pub fn new(ports: Vec<String>) -> Self {
        Self {
            ports,
            selection: None,
            sent: SentFrames::default(),
            replies: ReplyQueue::default(),
            device: None,
        }
    }

    /// Mock with the device simulation answering status queries.
    pub fn with_device(ports: Vec<String>) -> Self {
        Self {
            device: Some(DeviceSim::default()),
            ..Self::new(ports)
        }
    }

    /// Handle for asserting on sent frames after the transport moved into
    /// the task.
    pub fn sent(&self) -> SentFrames {
        self.sent.clone()
    }

    /// Handle for scripting replies after the transport moved into the task.
    pub fn reply_queue(&self) -> ReplyQueue {
        self.replies.clone()
    }
}

impl Transport for MockTransport {
    fn enumerate(&self) -> Result<Vec<PortDescriptor>, TransportError> {
        Ok(self
            .ports
            .iter()
            .map(|p| PortDescriptor { path: p.clone() })
            .collect())
    }

    fn select<'a>(&'a mut self, path: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            if !self.ports.iter().any(|p| p == path) {
                return Err(ConnectError::NotFound(path.to_string()));
            }
            self.selection = Some(path.to_string());
            Ok(())
        })
    }

    fn current_selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    fn disconnect(&mut self) {
        self.selection = None;
    }

    fn send<'a>(&'a mut self, frame: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            if self.selection.is_none() {
                return Err(TransportError::NotConnected);
            }
            lock_unpoisoned(&self.sent.0).push(frame.to_vec());
            if let Some(device) = self.device.as_mut() {
                if let Some(telemetry) = device.apply(frame) {
                    self.replies.push_status(&telemetry);
                }
            }
            Ok(())
        })
    }

    fn receive(&mut self, timeout: Duration) -> TransportFuture<'_, Vec<u8>> {
        Box::pin(async move {
            if self.selection.is_none() {
                return Err(TransportError::NotConnected);
            }
            match self.replies.pop() {
                Some(reply) => reply,
                None => Err(TransportError::Timeout(timeout)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_select_rejects_unknown_port() {
        let mut mock = MockTransport::new(vec!["/dev/ttyACM0".into()]);
        assert_eq!(
            mock.select("/dev/ttyUSB9").await,
            Err(ConnectError::NotFound("/dev/ttyUSB9".into()))
        );
        assert!(mock.current_selection().is_none());

        mock.select("/dev/ttyACM0").await.unwrap();
        assert_eq!(mock.current_selection(), Some("/dev/ttyACM0"));
    }

    #[tokio::test]
    async fn test_send_requires_selection() {
        let mut mock = MockTransport::new(vec!["/dev/ttyACM0".into()]);
        assert_eq!(
            mock.send(b";START\n").await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_scripted_replies_then_timeout() {
        let mut mock = MockTransport::new(vec!["/dev/ttyACM0".into()]);
        let replies = mock.reply_queue();
        mock.select("/dev/ttyACM0").await.unwrap();

        replies.push_frame(b";STOP F 0 0 0\n".to_vec());
        let timeout = Duration::from_millis(100);
        assert_eq!(
            mock.receive(timeout).await.unwrap(),
            b";STOP F 0 0 0\n".to_vec()
        );
        assert_eq!(
            mock.receive(timeout).await,
            Err(TransportError::Timeout(timeout))
        );
    }

    #[tokio::test]
    async fn test_device_simulation_tracks_commands() {
        let mut mock = MockTransport::with_device(vec!["/dev/ttyACM0".into()]);
        mock.select("/dev/ttyACM0").await.unwrap();
        let timeout = Duration::from_millis(100);

        mock.send(b";TARGET R 800\n").await.unwrap();
        mock.send(b";START\n").await.unwrap();
        mock.send(b";STATUS\n").await.unwrap();

        let frame = mock.receive(timeout).await.unwrap();
        let telemetry = wire::decode_status_frame(&frame).unwrap();
        assert_eq!(telemetry.state, ReportedState::Running);
        assert_eq!(telemetry.direction, Direction::Reverse);
        assert_eq!(telemetry.speed, 800);

        // The simulated emergency latch survives a stop command.
        mock.send(b";EMERG\n").await.unwrap();
        mock.send(b";STOP\n").await.unwrap();
        mock.send(b";STATUS\n").await.unwrap();
        let frame = mock.receive(timeout).await.unwrap();
        let telemetry = wire::decode_status_frame(&frame).unwrap();
        assert_eq!(telemetry.state, ReportedState::EmergencyStop);
    }
}
