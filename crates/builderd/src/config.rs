// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder daemon configuration: state-directory layout plus the
//! site-specific toolchain invocations this daemon treats as external
//! collaborators.
//!
//! Every path the daemon touches is resolved once at startup into a
//! plain struct of `PathBuf`s; nothing downstream re-derives a path from
//! the state directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use packhouse_builder_engine::{BuildCommands, ToolchainCommands};
use packhouse_core::{Arch, ArchMapping};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a state directory; set PACKHOUSE_BUILDERD_STATE_DIR")]
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

    #[error("config is missing required field `{0}`; this deployment's toolchain must be configured explicitly")]
    Missing(&'static str),
}

/// The deserialized, pre-validation shape of `builderd.yaml`. Every field
/// here is optional so a near-empty file is legal; `Config::load` rejects
/// the ones that have no safe default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub recipe_root: Option<PathBuf>,
    pub archs: Vec<String>,
    pub arch_mapping: std::collections::BTreeMap<String, Option<String>>,
    pub preferred_any_arch: Option<String>,
    pub package_suffix: Option<String>,

    pub build_file_name: Option<String>,
    pub fetch_version_command: Option<String>,
    pub list_artifacts_command: Option<String>,

    pub build_incremental_command: Option<String>,
    pub build_incremental_multiarch_command: Option<String>,
    pub build_clean_command: Option<String>,
    pub build_clean_multiarch_command: Option<String>,

    pub container_root: Option<PathBuf>,
    pub x86_shell_invocation: Vec<String>,
    pub arm_shell_invocation: Vec<String>,
    pub arm_shell_preamble: Option<String>,

    pub gpg_key_id: Option<String>,

    pub repo_socket_path: Option<PathBuf>,
    pub repo_token_path: Option<PathBuf>,
    pub repo_remote_spec: Option<String>,
    pub push_bandwidth_mbps: Option<f64>,

    pub update_check_interval_secs: Option<u64>,
    pub update_check_timeout_secs: Option<u64>,
}

/// Fully resolved configuration the daemon runs with.
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub token_path: PathBuf,
    pub ledger_path: PathBuf,
    pub log_dir: PathBuf,
    pub build_log_dir: PathBuf,

    pub recipe_root: PathBuf,
    pub archs: ArchMapping,
    pub package_suffix: String,

    pub toolchain: ToolchainCommands,
    pub build_commands: BuildCommands,

    pub container_root: PathBuf,
    pub x86_shell_invocation: Vec<String>,
    pub arm_shell_invocation: Vec<String>,
    pub arm_shell_preamble: Option<String>,

    pub gpg_key_id: String,

    pub repo_socket_path: PathBuf,
    pub repo_token_path: PathBuf,
    pub repo_remote_spec: String,
    pub push_bandwidth_mbps: f64,

    pub update_check_interval: Duration,
    pub update_check_timeout: Duration,
}

fn parse_archs(raw: &RawConfig) -> Result<ArchMapping, ConfigError> {
    if raw.archs.is_empty() {
        return Err(ConfigError::Missing("archs"));
    }
    let mut table = std::collections::BTreeMap::new();
    for arch in &raw.archs {
        let mapped = raw
            .arch_mapping
            .get(arch)
            .cloned()
            .unwrap_or_else(|| Some(arch.clone()));
        table.insert(Arch::new(arch), mapped.map(Arch::new));
    }
    let preferred = raw
        .preferred_any_arch
        .clone()
        .map(Arch::new)
        .or_else(|| table.keys().next().cloned())
        .ok_or(ConfigError::Missing("preferred_any_arch"))?;
    Ok(ArchMapping::new(table, preferred))
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

        let package_suffix = raw.package_suffix.clone().unwrap_or_else(|| "pkg.tar.xz".to_string());

        let toolchain = ToolchainCommands {
            build_file_name: raw.build_file_name.clone().unwrap_or_else(|| "PKGBUILD".to_string()),
            fetch_version_command: raw
                .fetch_version_command
                .clone()
                .ok_or(ConfigError::Missing("fetch_version_command"))?,
            list_artifacts_command: raw
                .list_artifacts_command
                .clone()
                .ok_or(ConfigError::Missing("list_artifacts_command"))?,
            package_suffix: package_suffix.clone(),
        };

        let build_commands = BuildCommands {
            incremental: raw
                .build_incremental_command
                .clone()
                .ok_or(ConfigError::Missing("build_incremental_command"))?,
            incremental_multiarch: raw
                .build_incremental_multiarch_command
                .clone()
                .ok_or(ConfigError::Missing("build_incremental_multiarch_command"))?,
            clean: raw
                .build_clean_command
                .clone()
                .ok_or(ConfigError::Missing("build_clean_command"))?,
            clean_multiarch: raw
                .build_clean_multiarch_command
                .clone()
                .ok_or(ConfigError::Missing("build_clean_multiarch_command"))?,
        };

        let archs = parse_archs(&raw)?;

        std::fs::create_dir_all(&state_dir).map_err(|source| ConfigError::Read {
            path: state_dir.clone(),
            source,
        })?;
        let log_dir = state_dir.join("logs");
        let build_log_dir = state_dir.join("build-logs");

        Ok(Self {
            socket_path: state_dir.join("builderd.sock"),
            lock_path: state_dir.join(".lock"),
            token_path: state_dir.join("token"),
            ledger_path: state_dir.join("pkgver.json"),
            log_dir,
            build_log_dir,
            recipe_root: raw.recipe_root.clone().unwrap_or_else(|| state_dir.join("pkgbuilds")),
            archs,
            package_suffix,
            toolchain,
            build_commands,
            container_root: raw
                .container_root
                .clone()
                .ok_or(ConfigError::Missing("container_root"))?,
            x86_shell_invocation: if raw.x86_shell_invocation.is_empty() {
                return Err(ConfigError::Missing("x86_shell_invocation"));
            } else {
                raw.x86_shell_invocation.clone()
            },
            arm_shell_invocation: if raw.arm_shell_invocation.is_empty() {
                return Err(ConfigError::Missing("arm_shell_invocation"));
            } else {
                raw.arm_shell_invocation.clone()
            },
            arm_shell_preamble: raw.arm_shell_preamble.clone(),
            gpg_key_id: raw.gpg_key_id.clone().ok_or(ConfigError::Missing("gpg_key_id"))?,
            repo_socket_path: raw
                .repo_socket_path
                .clone()
                .ok_or(ConfigError::Missing("repo_socket_path"))?,
            repo_token_path: raw
                .repo_token_path
                .clone()
                .ok_or(ConfigError::Missing("repo_token_path"))?,
            repo_remote_spec: raw
                .repo_remote_spec
                .clone()
                .ok_or(ConfigError::Missing("repo_remote_spec"))?,
            push_bandwidth_mbps: raw.push_bandwidth_mbps.unwrap_or(1.0),
            update_check_interval: Duration::from_secs(raw.update_check_interval_secs.unwrap_or(300)),
            update_check_timeout: Duration::from_secs(raw.update_check_timeout_secs.unwrap_or(3600)),
            state_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
archs: ["x86_64"]
fetch_version_command: "vercheck"
list_artifacts_command: "ls-artifacts"
build_incremental_command: "build"
build_incremental_multiarch_command: "build-multi"
build_clean_command: "build-clean"
build_clean_multiarch_command: "build-clean-multi"
container_root: "/containers"
x86_shell_invocation: ["arch-nspawn"]
arm_shell_invocation: ["arm-nspawn"]
gpg_key_id: "ABCDEF"
repo_socket_path: "/run/repod.sock"
repo_token_path: "/run/repod.token"
repo_remote_spec: "repo:updates/"
"#
    }

    #[test]
    fn loads_a_fully_specified_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("builderd.yaml");
        std::fs::write(&path, minimal_yaml()).unwrap();
        let config = Config::load(&path, tmp.path().join("state")).unwrap();
        assert_eq!(config.package_suffix, "pkg.tar.xz");
        assert_eq!(config.repo_remote_spec, "repo:updates/");
        assert_eq!(config.push_bandwidth_mbps, 1.0);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("builderd.yaml");
        std::fs::write(&path, "archs: [\"x86_64\"]\n").unwrap();
        let err = Config::load(&path, tmp.path().join("state")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("fetch_version_command")));
    }

    #[test]
    fn absent_config_file_uses_defaults_and_still_rejects_missing_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("does-not-exist.yaml");
        let err = Config::load(&path, tmp.path().join("state")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("archs")));
    }
}
