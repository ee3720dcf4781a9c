// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod spindle;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use spindle::command::SpindleCommand;
pub use spindle::request::{SpindleReply, SpindleRequest};
pub use spindle::response::{SpindleError, SpindleResult};
pub use spindle::state::{
    CommandedState, Direction, ObservedState, RunState, SpindleSnapshot, SpindleStateDto,
    DEFAULT_MAX_SPEED,
};
