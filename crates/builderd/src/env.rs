// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the builder daemon crate.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Resolve the state directory: `PACKHOUSE_BUILDERD_STATE_DIR` override,
/// else the platform state-dir joined with `packhouse/builderd`.
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("PACKHOUSE_BUILDERD_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::state_dir()
        .map(|d| d.join("packhouse").join("builderd"))
        .ok_or(ConfigError::NoStateDir)
}

/// Recipe tree root override, else `<state_dir>/pkgbuilds`.
pub fn recipe_root_override() -> Option<PathBuf> {
    std::env::var_os("PACKHOUSE_RECIPE_ROOT").map(PathBuf::from)
}

/// Config file path override, else `<state_dir>/builderd.yaml`.
pub fn config_path_override() -> Option<PathBuf> {
    std::env::var_os("PACKHOUSE_BUILDERD_CONFIG").map(PathBuf::from)
}
