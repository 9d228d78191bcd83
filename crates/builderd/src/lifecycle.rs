// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder daemon startup: lock acquisition, auth token provisioning, and
//! socket binding. Lock first, then build out the rest of the state
//! directory, then bind the socket last so a partially initialized
//! daemon never appears reachable.

use std::path::PathBuf;

use packhouse_core::VersionLedger;
use packhouse_storage::{LedgerStore, LedgerStoreError, LockError, StateLock};
use thiserror::Error;
use tokio::net::UnixListener;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another builder daemon instance is already running: {0}")]
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

    #[error(transparent)]
    Ledger(#[from] LedgerStoreError),

    #[error("refusing to start: this process appears to already be running inside a supervised container")]
    NestedContainer,
}

pub struct StartupResult {
    pub listener: UnixListener,
    pub ledger: VersionLedger,
    pub token: packhouse_protocol::AuthToken,
    /// Held for the daemon's lifetime; releases the exclusive lock on drop.
    pub lock: StateLock,
}

/// The builder refuses to start if it detects it is itself running
/// inside a container isolation boundary of the kind it supervises, to
/// avoid accidental recursive nesting. `container` is the
/// systemd convention set by `systemd-nspawn`; `/run/systemd/container`
/// is its fallback marker for non-systemd-managed containers.
pub fn refuses_nested_container() -> bool {
    std::env::var_os("container").is_some() || std::path::Path::new("/run/systemd/container").exists()
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
    if refuses_nested_container() {
        return Err(LifecycleError::NestedContainer);
    }

    let lock = StateLock::acquire(&config.state_dir).map_err(LifecycleError::LockFailed)?;

    std::fs::create_dir_all(&config.log_dir).map_err(|source| LifecycleError::Token {
        path: config.log_dir.clone(),
        source,
    })?;
    std::fs::create_dir_all(&config.build_log_dir).map_err(|source| LifecycleError::Token {
        path: config.build_log_dir.clone(),
        source,
    })?;
    std::fs::create_dir_all(&config.recipe_root).map_err(|source| LifecycleError::Token {
        path: config.recipe_root.clone(),
        source,
    })?;

    ensure_token(&config.token_path)?;
    let token = packhouse_protocol::AuthToken::load(&config.token_path).map_err(|source| LifecycleError::Token {
        path: config.token_path.clone(),
        source,
    })?;

    let ledger = LedgerStore::new(config.ledger_path.clone()).load()?;

    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    let listener = UnixListener::bind(&config.socket_path).map_err(|source| LifecycleError::BindFailed {
        path: config.socket_path.clone(),
        source,
    })?;

    Ok(StartupResult {
        listener,
        ledger,
        token,
        lock,
    })
}

/// Remove everything `startup` could have left behind if it fails partway
/// through, except when the failure itself means another instance owns
/// these files (don't clean up a running daemon's socket out from under it).
pub fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
}
