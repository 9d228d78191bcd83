// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the repo daemon crate.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Resolve the state directory: `PACKHOUSE_REPOD_STATE_DIR` override,
/// else the platform state-dir joined with `packhouse/repod`.
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("PACKHOUSE_REPOD_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::state_dir()
        .map(|d| d.join("packhouse").join("repod"))
        .ok_or(ConfigError::NoStateDir)
}

/// Config file path override, else `<state_dir>/repod.yaml`.
pub fn config_path_override() -> Option<PathBuf> {
    std::env::var_os("PACKHOUSE_REPOD_CONFIG").map(PathBuf::from)
}
