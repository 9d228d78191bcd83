// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detached-signature creation and verification.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::supervisor::{self, SupervisorConfig, SupervisorError};

const SIGN_TIMEOUT: Duration = Duration::from_secs(60);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GpgError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Wraps the `gpg` binary for the two operations the builder and repo
/// daemon actually need: produce a detached signature, and verify one.
#[derive(Debug, Clone)]
pub struct Gpg {
    key_id: String,
}

impl Gpg {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
        }
    }

    /// Produce `artifact.sig` next to `artifact` using a detached,
    /// non-armored signature under the configured key.
    pub async fn sign(&self, artifact: &Path) -> Result<(), GpgError> {
        let mut cmd = Command::new("gpg");
        cmd.args([
            "--default-key",
            &self.key_id,
            "--no-armor",
            "--pinentry-mode",
            "loopback",
            "--passphrase",
            "",
            "--detach-sign",
            "--yes",
            "--",
        ])
        .arg(artifact);
        supervisor::run(
            cmd,
            vec!["gpg".into(), "--detach-sign".into()],
            SupervisorConfig::new(SIGN_TIMEOUT, SIGN_TIMEOUT),
        )
        .await?;
        Ok(())
    }

    /// Verify `sig` against `artifact`, returning `Ok(())` only if the
    /// signature checks out.
    pub async fn verify(&self, sig: &Path, artifact: &Path) -> Result<(), GpgError> {
        let mut cmd = Command::new("gpg");
        cmd.arg("--verify").arg(sig).arg(artifact);
        supervisor::run(
            cmd,
            vec!["gpg".into(), "--verify".into()],
            SupervisorConfig::new(VERIFY_TIMEOUT, VERIFY_TIMEOUT),
        )
        .await?;
        Ok(())
    }
}
