// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persists the `VersionLedger` as `pkgver.json`: an object mapping
//! `dirname` to the two-element sequence `[version_string, failure_count]`.
//! Mutation is atomic per tick: the entire ledger is serialized and
//! rewritten.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use packhouse_core::{LedgerEntry, Version, VersionLedger};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("reading ledger at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing ledger at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Fatal at startup only.
    #[error("ledger at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk entry shape: `[version_string_or_null, failure_count]`. Most
/// entries carry a version; an entry can exist with no recorded version
/// yet if only update-check failures have been observed for a recipe.
type WireEntry = (Option<String>, u32);

pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the ledger. A missing file is an empty ledger; a file that
    /// fails to parse is `LedgerStoreError::Corrupt` and must be treated
    /// as fatal by the caller.
    pub fn load(&self) -> Result<VersionLedger, LedgerStoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(VersionLedger::new())
            }
            Err(source) => {
                return Err(LedgerStoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let wire: BTreeMap<String, WireEntry> =
            serde_json::from_str(&contents).map_err(|source| LedgerStoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let map = wire
            .into_iter()
            .map(|(dirname, (version, failures))| {
                (
                    dirname,
                    LedgerEntry {
                        last_built_version: version.map(Version::new),
                        failures,
                    },
                )
            })
            .collect();
        Ok(VersionLedger::from_map(map))
    }

    /// Serialize the whole ledger and atomically replace the file:
    /// write to a sibling temp file, then rename over the target so a
    /// concurrent reader (or a crash mid-write) never observes a
    /// half-written document.
    pub fn save(&self, ledger: &VersionLedger) -> Result<(), LedgerStoreError> {
        let wire: BTreeMap<String, WireEntry> = ledger
            .iter()
            .map(|(dirname, entry)| {
                (
                    dirname.to_string(),
                    (
                        entry.last_built_version.as_ref().map(|v| v.as_str().to_string()),
                        entry.failures,
                    ),
                )
            })
            .collect();
        let body = serde_json::to_vec_pretty(&wire).map_err(|source| LedgerStoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("pkgver.json")
        ));
        std::fs::write(&tmp_path, &body).map_err(|source| LedgerStoreError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|source| LedgerStoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(tmp.path().join("pkgver.json"));
        let ledger = store.load().unwrap();
        assert_eq!(ledger.into_map().len(), 0);
    }

    #[test]
    fn round_trips_versions_and_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pkgver.json");
        let store = LedgerStore::new(&path);

        let mut ledger = VersionLedger::new();
        ledger.record_check_failure("flaky");
        ledger.record_check_failure("flaky");
        let mut map = ledger.into_map();
        map.insert(
            "foo".to_string(),
            LedgerEntry {
                last_built_version: Some(Version::new("1.2-1")),
                failures: 0,
            },
        );
        let ledger = VersionLedger::from_map(map);

        store.save(&ledger).unwrap();
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.entry("flaky").failures, 2);
        assert_eq!(
            reloaded.entry("foo").last_built_version,
            Some(Version::new("1.2-1"))
        );
    }

    #[test]
    fn corrupt_json_is_reported_as_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pkgver.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = LedgerStore::new(&path);
        assert!(matches!(
            store.load(),
            Err(LedgerStoreError::Corrupt { .. })
        ));
    }
}
