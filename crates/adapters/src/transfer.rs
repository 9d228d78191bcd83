// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wraps the external file-transfer command used to ship artifacts to the
//! repo daemon's `updates/` staging directory. This module only
//! supervises whatever binary is configured (`rsync` by default) the
//! same way every other external tool in this crate is supervised.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::supervisor::{self, SupervisorConfig, SupervisorError};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Ships a local file to a remote destination spec (e.g.
/// `host:/path/to/updates/`) via an external transfer binary.
#[derive(Debug, Clone)]
pub struct FileTransfer {
    binary: String,
    extra_args: Vec<String>,
}

impl Default for FileTransfer {
    fn default() -> Self {
        Self {
            binary: "rsync".to_string(),
            extra_args: vec!["-a".to_string()],
        }
    }
}

impl FileTransfer {
    pub fn new(binary: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args,
        }
    }

    pub async fn send(
        &self,
        local_path: &Path,
        remote_spec: &str,
        timeout: Duration,
    ) -> Result<(), TransferError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.extra_args).arg(local_path).arg(remote_spec);
        supervisor::run(
            cmd,
            vec![self.binary.clone(), local_path.display().to_string()],
            SupervisorConfig::new(timeout, timeout),
        )
        .await?;
        Ok(())
    }
}
