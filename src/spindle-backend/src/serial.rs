// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Serial transport for the spindle controller.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialPortType, SerialStream};

use crate::transport::{
    ConnectError, ConnectFuture, PortDescriptor, Transport, TransportError, TransportFuture,
};

/// Baud rate of the controller's native CAT-style interface.
pub const DEFAULT_BAUD: u32 = 9_600;

/// STMicroelectronics vendor id; the stock controller board enumerates
/// with it.
pub const DEFAULT_USB_VID: u16 = 0x0483;

/// Upper bound on one telemetry line; anything longer is a framing fault.
const MAX_FRAME_LEN: usize = 128;

/// Transport over a real serial port, 8N1 at the controller's fixed baud.
pub struct SerialTransport {
    baud: u32,
    usb_vid: Option<u16>,
    selection: Option<String>,
    port: Option<SerialStream>,
    in_flight: bool,
}

impl SerialTransport {
    pub fn new(baud: u32, usb_vid: Option<u16>) -> Self {
        Self {
            baud,
            usb_vid,
            selection: None,
            port: None,
            in_flight: false,
        }
    }

    /// List all attached ports without the USB vendor filter.
    ///
    /// Selection is validated against this wider list so an operator can
    /// still pick an adapter the filter would hide.
    fn enumerate_unfiltered(&self) -> Result<Vec<String>, TransportError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| TransportError::Enumerate(e.to_string()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

impl Transport for SerialTransport {
    fn enumerate(&self) -> Result<Vec<PortDescriptor>, TransportError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| TransportError::Enumerate(e.to_string()))?;

        Ok(ports
            .into_iter()
            .filter(|p| match (self.usb_vid, &p.port_type) {
                (Some(vid), SerialPortType::UsbPort(info)) => info.vid == vid,
                (Some(_), _) => false,
                (None, _) => true,
            })
            .map(|p| PortDescriptor { path: p.port_name })
            .collect())
    }

    fn select<'a>(&'a mut self, path: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let attached = self.enumerate_unfiltered().map_err(|e| ConnectError::Io {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
            if !attached.iter().any(|p| p == path) {
                return Err(ConnectError::NotFound(path.to_string()));
            }

            // Close the previous connection before opening the new one;
            // the device may reset its buffers on open.
            self.port = None;
            self.selection = None;
            self.in_flight = false;

            let stream = tokio_serial::new(path, self.baud)
                .open_native_async()
                .map_err(|e| match e.kind() {
                    tokio_serial::ErrorKind::NoDevice => ConnectError::NotFound(path.to_string()),
                    tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                        ConnectError::Busy(path.to_string())
                    }
                    _ => ConnectError::Io {
                        path: path.to_string(),
                        reason: e.to_string(),
                    },
                })?;
            let _ = stream.clear(ClearBuffer::All);

            tracing::info!("Serial port {} open at {} baud", path, self.baud);
            self.selection = Some(path.to_string());
            self.port = Some(stream);
            Ok(())
        })
    }

    fn current_selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    fn disconnect(&mut self) {
        if let Some(path) = self.selection.take() {
            tracing::info!("Closing serial port {}", path);
        }
        self.port = None;
        self.in_flight = false;
    }

    fn send<'a>(&'a mut self, frame: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            if self.in_flight {
                return Err(TransportError::Busy);
            }
            if self.port.is_none() {
                return Err(TransportError::NotConnected);
            }

            self.in_flight = true;
            let result = async {
                let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
                port.write_all(frame)
                    .await
                    .map_err(|e| TransportError::Io(e.to_string()))?;
                port.flush()
                    .await
                    .map_err(|e| TransportError::Io(e.to_string()))
            }
            .await;
            self.in_flight = false;
            result
        })
    }

    fn receive(&mut self, receive_timeout: Duration) -> TransportFuture<'_, Vec<u8>> {
        Box::pin(async move {
            if self.in_flight {
                return Err(TransportError::Busy);
            }
            if self.port.is_none() {
                return Err(TransportError::NotConnected);
            }

            self.in_flight = true;
            let result = async {
                let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
                let mut frame = Vec::new();
                let mut byte = [0u8; 1];
                let read = timeout(receive_timeout, async {
                    loop {
                        port.read_exact(&mut byte)
                            .await
                            .map_err(|e| TransportError::Io(e.to_string()))?;
                        frame.push(byte[0]);
                        if byte[0] == b'\n' {
                            return Ok(());
                        }
                        if frame.len() > MAX_FRAME_LEN {
                            return Err(TransportError::Io(
                                "frame exceeds maximum length".to_string(),
                            ));
                        }
                    }
                })
                .await;
                match read {
                    Ok(Ok(())) => Ok(frame),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(TransportError::Timeout(receive_timeout)),
                }
            }
            .await;
            self.in_flight = false;
            result
        })
    }
}
