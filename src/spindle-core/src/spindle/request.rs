// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::sync::oneshot;

use crate::spindle::command::SpindleCommand;
use crate::spindle::response::SpindleResult;
use crate::spindle::state::SpindleSnapshot;

/// Successful reply payload from the spindle task.
#[derive(Debug, Clone)]
pub enum SpindleReply {
    Snapshot(SpindleSnapshot),
    Ports(Vec<String>),
}

/// Request sent to the spindle task.
#[derive(Debug)]
pub struct SpindleRequest {
    pub cmd: SpindleCommand,
    pub respond_to: oneshot::Sender<SpindleResult<SpindleReply>>,
}
