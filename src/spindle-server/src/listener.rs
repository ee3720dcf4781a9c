// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-over-TCP listener for spindle-server.
//!
//! Accepts client connections speaking the `ClientCommand`/`ClientResponse`
//! line protocol from `spindle-protocol`. Read-only accessors are served
//! straight from the watch channel and never fail; mutating commands are
//! routed to the spindle task and answer with its result.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use spindle_core::{SpindleReply, SpindleResult, SpindleSnapshot};
use spindle_protocol::codec::parse_command;
use spindle_protocol::mapping;
use spindle_protocol::types::{ClientCommand, ClientResponse};

use crate::handle::SpindleHandle;

/// Run the JSON TCP listener, accepting client connections.
pub async fn run_listener(addr: SocketAddr, handle: SpindleHandle) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Client connected: {}", peer);

        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, peer, handle).await {
                error!("Client {} error: {:?}", peer, e);
            }
        });
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    handle: SpindleHandle,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            info!("Client {} disconnected", addr);
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let cmd = match parse_command(trimmed) {
            Ok(cmd) => cmd,
            Err(e) => {
                error!("Invalid JSON from {}: {} / {:?}", addr, trimmed, e);
                write_response(&mut writer, &ClientResponse::failure(format!("Invalid JSON: {e}")))
                    .await?;
                continue;
            }
        };

        // Fast path: the read-only accessors are answered from the watch
        // channel, so they stay responsive (with an Offline fallback)
        // whatever the transport is doing.
        if is_read_accessor(&cmd) {
            let response = read_response(&cmd, &handle.snapshot());
            write_response(&mut writer, &response).await?;
            continue;
        }

        let result = handle.request(mapping::client_command_to_spindle(cmd)).await;
        write_response(&mut writer, &command_response(result)).await?;
    }

    Ok(())
}

fn is_read_accessor(cmd: &ClientCommand) -> bool {
    matches!(
        cmd,
        ClientCommand::GetSpindleState
            | ClientCommand::GetSelectedPort
            | ClientCommand::GetMaxSpindleSpeed
    )
}

/// Build the response for a read-only accessor from a snapshot.
fn read_response(cmd: &ClientCommand, snapshot: &SpindleSnapshot) -> ClientResponse {
    match cmd {
        ClientCommand::GetSpindleState => ClientResponse {
            success: true,
            state: Some(snapshot.to_dto()),
            ..ClientResponse::default()
        },
        ClientCommand::GetSelectedPort => ClientResponse {
            success: true,
            port: snapshot.selected_port.clone(),
            ..ClientResponse::default()
        },
        ClientCommand::GetMaxSpindleSpeed => ClientResponse {
            success: true,
            max_speed: Some(snapshot.commanded.max_speed),
            ..ClientResponse::default()
        },
        _ => ClientResponse::failure("not a read accessor"),
    }
}

/// Translate a spindle task reply into the client response shape.
fn command_response(result: SpindleResult<SpindleReply>) -> ClientResponse {
    match result {
        Ok(SpindleReply::Snapshot(snapshot)) => ClientResponse {
            success: true,
            state: Some(snapshot.to_dto()),
            ..ClientResponse::default()
        },
        Ok(SpindleReply::Ports(ports)) => ClientResponse {
            success: true,
            ports: Some(ports),
            ..ClientResponse::default()
        },
        Err(e) => ClientResponse::failure(e.to_string()),
    }
}

async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &ClientResponse,
) -> std::io::Result<()> {
    let line = serde_json::to_string(response)? + "\n";
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
