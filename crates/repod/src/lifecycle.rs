// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repo daemon startup: lock acquisition, auth token provisioning, served
//! tree layout, and socket binding.
//!
//! Mirrors `packhouse_builderd::lifecycle::startup` (lock first, build
//! out the rest of the state directory, bind the socket last).

use std::path::PathBuf;

use packhouse_storage::{LockError, RepoLayout, StateLock};
use thiserror::Error;
use tokio::net::UnixListener;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another repo daemon instance is already running: {0}")]
    LockFailed(#[source] LockError),

    #[error("failed to bind control socket at {path}: {source}")]
    BindFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to provision auth token at {path}: {source}")]
    Token {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct StartupResult {
    pub listener: UnixListener,
    pub token: packhouse_protocol::AuthToken,
    /// Held for the daemon's lifetime; releases the exclusive lock on drop.
    pub lock: StateLock,
}

fn ensure_token(path: &std::path::Path) -> Result<(), LifecycleError> {
    if path.exists() {
        return Ok(());
    }
    use std::io::Write;
    #[cfg(unix)]
    use std::os::unix::fs::OpenOptionsExt;

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    opts.mode(0o600);
    let mut file = opts.open(path).map_err(|source| LifecycleError::Token {
        path: path.to_path_buf(),
        source,
    })?;
    let token = uuid::Uuid::new_v4().simple().to_string();
    file.write_all(token.as_bytes()).map_err(|source| LifecycleError::Token {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    let lock = StateLock::acquire(&config.state_dir).map_err(LifecycleError::LockFailed)?;

    std::fs::create_dir_all(&config.log_dir).map_err(|source| LifecycleError::Token {
        path: config.log_dir.clone(),
        source,
    })?;

    let layout = RepoLayout::new(&config.repo_root, &config.package_suffix);
    layout.ensure_dirs(&config.archs).map_err(|source| LifecycleError::Token {
        path: config.repo_root.clone(),
        source,
    })?;

    ensure_token(&config.token_path)?;
    let token = packhouse_protocol::AuthToken::load(&config.token_path).map_err(|source| LifecycleError::Token {
        path: config.token_path.clone(),
        source,
    })?;

    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    let listener = UnixListener::bind(&config.socket_path).map_err(|source| LifecycleError::BindFailed {
        path: config.socket_path.clone(),
        source,
    })?;

    Ok(StartupResult { listener, token, lock })
}
