// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thin handle giving the listener access to the spindle task and state.

use tokio::sync::{mpsc, oneshot, watch};

use spindle_core::{
    SpindleCommand, SpindleError, SpindleReply, SpindleRequest, SpindleResult, SpindleSnapshot,
};

/// A handle to the running spindle task.
///
/// Clones cheaply; every client connection gets one.
#[derive(Clone)]
pub struct SpindleHandle {
    /// Normal command channel, drained in arrival order.
    pub cmd_tx: mpsc::Sender<SpindleRequest>,
    /// Priority channel; emergency stops overtake queued commands here.
    pub estop_tx: mpsc::Sender<SpindleRequest>,
    /// Watch the latest snapshot for fast read-only responses.
    pub state_rx: watch::Receiver<SpindleSnapshot>,
}

impl SpindleHandle {
    /// Send a command to the spindle task and await its reply.
    ///
    /// Emergency stops travel on the priority channel so they are never
    /// queued behind a pending command.
    pub async fn request(&self, cmd: SpindleCommand) -> SpindleResult<SpindleReply> {
        let emergency = matches!(cmd, SpindleCommand::EmergencyStop);
        let (resp_tx, resp_rx) = oneshot::channel();
        let req = SpindleRequest {
            cmd,
            respond_to: resp_tx,
        };

        let channel = if emergency {
            &self.estop_tx
        } else {
            &self.cmd_tx
        };
        channel
            .send(req)
            .await
            .map_err(|_| SpindleError::Communication("spindle task not available".into()))?;

        resp_rx
            .await
            .map_err(|_| SpindleError::Communication("spindle task dropped the request".into()))?
    }

    /// Latest published snapshot; never fails.
    pub fn snapshot(&self) -> SpindleSnapshot {
        self.state_rx.borrow().clone()
    }
}
