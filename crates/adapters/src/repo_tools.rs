// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wrappers for the external repository-database toolchain.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::supervisor::{self, SupervisorConfig, SupervisorError};

const TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum RepoToolsError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Wraps `repo-add`/`repo-remove`, used to (re)generate a per-arch
/// database after artifacts are integrated or removed.
#[derive(Debug, Clone, Default)]
pub struct RepoTools;

impl RepoTools {
    pub fn new() -> Self {
        Self
    }

    /// `repo-add --verify --remove <db> <files...>`: adds/updates entries
    /// and evicts stale ones no longer present on disk.
    pub async fn add(&self, db_path: &Path, files: &[PathBuf]) -> Result<(), RepoToolsError> {
        let mut cmd = Command::new("repo-add");
        cmd.args(["--verify", "--remove"]).arg(db_path).args(files);
        supervisor::run(
            cmd,
            vec!["repo-add".into(), db_path.display().to_string()],
            SupervisorConfig::new(TIMEOUT, TIMEOUT),
        )
        .await?;
        Ok(())
    }

    /// `repo-remove --verify <db> <pkgnames...>`.
    pub async fn remove(&self, db_path: &Path, pkgnames: &[String]) -> Result<(), RepoToolsError> {
        let mut cmd = Command::new("repo-remove");
        cmd.arg("--verify").arg(db_path).args(pkgnames);
        supervisor::run(
            cmd,
            vec!["repo-remove".into(), db_path.display().to_string()],
            SupervisorConfig::new(TIMEOUT, TIMEOUT),
        )
        .await?;
        Ok(())
    }
}
