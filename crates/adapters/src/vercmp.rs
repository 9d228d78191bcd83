// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The domain's canonical version-compare relation, implemented by
//! shelling out to the external comparator.

use std::cmp::Ordering;
use std::time::Duration;

use packhouse_core::{Version, VersionCompare, VersionCompareError};
use tokio::process::Command;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Shells out to the `vercmp` binary for every comparison.
#[derive(Debug, Clone)]
pub struct ExternalVercmp {
    binary: String,
}

impl Default for ExternalVercmp {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalVercmp {
    pub fn new() -> Self {
        Self {
            binary: "vercmp".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait::async_trait]
impl VersionCompare for ExternalVercmp {
    async fn compare(&self, a: &Version, b: &Version) -> Result<Ordering, VersionCompareError> {
        let fut = Command::new(&self.binary)
            .arg(a.as_str())
            .arg(b.as_str())
            .output();
        let output = tokio::time::timeout(TIMEOUT, fut)
            .await
            .map_err(|_| VersionCompareError::CommandFailed(format!("{} timed out", self.binary)))?
            .map_err(|e| VersionCompareError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(VersionCompareError::CommandFailed(format!(
                "{} exited with {:?}",
                self.binary,
                output.status.code()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.trim() {
            "-1" => Ok(Ordering::Less),
            "0" => Ok(Ordering::Equal),
            "1" => Ok(Ordering::Greater),
            other => Err(VersionCompareError::UnparseableResult(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "vercmp_tests.rs"]
mod tests;
