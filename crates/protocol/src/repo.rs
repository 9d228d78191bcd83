// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The repo daemon ControlServer's RPC surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "function", content = "args", rename_all = "snake_case")]
pub enum RepoRequest {
    Clean,
    Regenerate { archs: Option<Vec<String>> },
    Remove { names: Vec<String>, archs: Option<Vec<String>> },
    Update { overwrite: bool },
    PushStart { filenames: Vec<String>, sizes: Vec<u64> },
    PushAddTime { name: String, extra: f64 },
    PushDone { filenames: Vec<String>, overwrite: bool },
    PushFail { name: String },
}

/// `push_start`'s result: either a per-file timeout list on success, or
/// an integer busy marker when a reservation is already held.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PushStartResult {
    Timeouts(Vec<f64>),
    Busy(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepoResponse {
    Ok { detail: Option<String> },
    Bool { value: bool },
    PushStart { result: PushStartResult },
    /// `push_done`'s error sentinel: `None` on success, or a human-readable
    /// error string.
    PushDone { error: Option<String> },
    Unknown,
}
