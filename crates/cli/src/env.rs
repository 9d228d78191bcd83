// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default socket/token path resolution, mirroring each daemon's own
//! `env::state_dir` so `phctl` finds them without extra configuration.

use std::path::PathBuf;

fn state_dir(env_var: &str, leaf: &str) -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(env_var) {
        return Some(PathBuf::from(dir));
    }
    dirs::state_dir().map(|d| d.join("packhouse").join(leaf))
}

pub fn builder_state_dir() -> Option<PathBuf> {
    state_dir("PACKHOUSE_BUILDERD_STATE_DIR", "builderd")
}

pub fn repo_state_dir() -> Option<PathBuf> {
    state_dir("PACKHOUSE_REPOD_STATE_DIR", "repod")
}
