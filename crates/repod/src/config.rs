// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repo daemon configuration: state-directory layout, served-tree root,
//! and the packaging-toolchain invocations treated as external
//! collaborators.
//!
//! Mirrors `packhouse_builderd::config`'s split between `RawConfig` (the
//! near-empty-file-legal deserialized shape) and `Config` (fully
//! resolved, every field present).

use std::path::{Path, PathBuf};
use std::time::Duration;

use packhouse_core::Arch;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a state directory; set PACKHOUSE_REPOD_STATE_DIR")]
    NoStateDir,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config is missing required field `{0}`; this deployment's repository must be configured explicitly")]
    Missing(&'static str),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub repo_root: Option<PathBuf>,
    pub archs: Vec<String>,
    pub package_suffix: Option<String>,
    pub gpg_key_id: Option<String>,
    pub push_bandwidth_mbps: Option<f64>,
    pub archive_keep_new: Option<usize>,
}

/// Fully resolved configuration the daemon runs with.
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub token_path: PathBuf,
    pub log_dir: PathBuf,

    pub repo_root: PathBuf,
    pub archs: Vec<Arch>,
    pub package_suffix: String,
    pub gpg_key_id: String,
    pub push_bandwidth_mbps: f64,

    /// `2·size_MB / (bandwidth_Mbps/8)`, floor 120 s.
    pub push_timeout_floor: Duration,

    /// `keep_new` used by the bare `clean()` RPC's archive eviction; the
    /// wire protocol carries no argument for it, so this is the
    /// deployment-configurable default (falls back to 1, matching every
    /// other `filter_old` call site).
    pub archive_keep_new: usize,
}

impl Config {
    pub fn load(path: &Path, state_dir: PathBuf) -> Result<Self, ConfigError> {
        let raw = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            RawConfig::default()
        };

        if raw.archs.is_empty() {
            return Err(ConfigError::Missing("archs"));
        }
        let archs: Vec<Arch> = raw.archs.iter().map(Arch::new).collect();

        std::fs::create_dir_all(&state_dir).map_err(|source| ConfigError::Read {
            path: state_dir.clone(),
            source,
        })?;
        let log_dir = state_dir.join("logs");

        Ok(Self {
            socket_path: state_dir.join("repod.sock"),
            lock_path: state_dir.join(".lock"),
            token_path: state_dir.join("token"),
            log_dir,
            repo_root: raw.repo_root.clone().ok_or(ConfigError::Missing("repo_root"))?,
            archs,
            package_suffix: raw.package_suffix.clone().unwrap_or_else(|| "pkg.tar.xz".to_string()),
            gpg_key_id: raw.gpg_key_id.clone().ok_or(ConfigError::Missing("gpg_key_id"))?,
            push_bandwidth_mbps: raw.push_bandwidth_mbps.unwrap_or(1.0),
            push_timeout_floor: Duration::from_secs(120),
            archive_keep_new: raw.archive_keep_new.unwrap_or(1),
            state_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_fully_specified_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("repod.yaml");
        std::fs::write(
            &path,
            r#"
repo_root: "/srv/repo"
archs: ["x86_64", "aarch64"]
gpg_key_id: "ABCDEF"
"#,
        )
        .unwrap();
        let config = Config::load(&path, tmp.path().join("state")).unwrap();
        assert_eq!(config.archs.len(), 2);
        assert_eq!(config.package_suffix, "pkg.tar.xz");
        assert_eq!(config.archive_keep_new, 1);
    }

    #[test]
    fn missing_archs_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("repod.yaml");
        std::fs::write(&path, "gpg_key_id: \"ABCDEF\"\n").unwrap();
        let err = Config::load(&path, tmp.path().join("state")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("archs")));
    }

    #[test]
    fn missing_repo_root_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("repod.yaml");
        std::fs::write(&path, "archs: [\"x86_64\"]\ngpg_key_id: \"ABCDEF\"\n").unwrap();
        let err = Config::load(&path, tmp.path().join("state")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("repo_root")));
    }
}
