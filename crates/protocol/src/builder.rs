// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The builder ControlServer's RPC surface.

use serde::{Deserialize, Serialize};

/// Whitelisted requests the builder's control server dispatches. Anything
/// else is rejected with `Response::Unknown` rather than attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "function", content = "args", rename_all = "snake_case")]
pub enum BuilderRequest {
    Info { human: bool },
    RebuildPackage { dirname: String, clean: bool },
    Clean { dirname: String },
    CleanAll,
    ForceUpload { dirname: String, overwrite: bool },
    Getup,
    Extras { action: String, pkgname: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuilderResponse {
    Info { text: String },
    Ok { detail: Option<String> },
    Bool { value: bool },
    Unknown,
}
