// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An advisory, held-for-process-lifetime lock file guarding a daemon's
//! state directory against a second instance starting concurrently.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("opening lock file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state directory {path} is already locked by another process")]
    AlreadyLocked { path: PathBuf },
}

/// Holds an exclusive, non-blocking advisory lock on `<state_dir>/.lock`
/// for as long as this value lives.
pub struct StateLock {
    _file: File,
}

impl StateLock {
    pub fn acquire(state_dir: &Path) -> Result<Self, LockError> {
        let path = state_dir.join(".lock");
        let file = File::create(&path).map_err(|source| LockError::Open {
            path: path.clone(),
            source,
        })?;
        file.try_lock_exclusive()
            .map_err(|_| LockError::AlreadyLocked { path: path.clone() })?;
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_in_same_directory_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let first = StateLock::acquire(tmp.path()).unwrap();
        let second = StateLock::acquire(tmp.path());
        assert!(matches!(second, Err(LockError::AlreadyLocked { .. })));
        drop(first);
        assert!(StateLock::acquire(tmp.path()).is_ok());
    }
}
