// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Optional persistence of the configured maximum spindle speed.
//!
//! The maximum speed is process-durable either way; writing it to a small
//! JSON state file (enabled via `[general].state_file`) carries it across
//! restarts.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    max_spindle_speed: u32,
}

/// Load the persisted max speed, if the state file exists and parses.
///
/// A missing file is the normal first-run case; a corrupt one is logged
/// and ignored so the configured default applies.
pub fn load_max_speed(path: &Path) -> Option<u32> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read state file {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<PersistedState>(&content) {
        Ok(state) => Some(state.max_spindle_speed),
        Err(e) => {
            warn!("Ignoring corrupt state file {}: {}", path.display(), e);
            None
        }
    }
}

/// Write the max speed to the state file, creating parent directories.
pub fn store_max_speed(path: &Path, max_speed: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let state = PersistedState {
        max_spindle_speed: max_speed,
    };
    let content = serde_json::to_string(&state).map_err(io::Error::other)?;
    std::fs::write(path, content)
}
