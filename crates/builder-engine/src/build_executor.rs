// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runs one job through clean → prebuild → build → postbuild → sign →
//! upload → post-clean. Hook failures (prebuild/postbuild/failure) are
//! logged and swallowed; only the main build invocation aborts the job.

use std::path::{Path, PathBuf};
use std::time::Duration;

use packhouse_adapters::{ContainerShell, Gpg, SupervisorConfig};
use packhouse_core::{parse_artifact, Arch, Job};
use packhouse_recipe::PackageConfig;
use thiserror::Error;

use crate::upload_client::{remote_name_for, UploadClient, UploadError, UploadFile};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build command failed for {dirname}: {source}")]
    Build {
        dirname: String,
        #[source]
        source: packhouse_adapters::ContainerShellError,
    },
    #[error(transparent)]
    Sign(#[from] packhouse_adapters::GpgError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("cleaning {path}: {source}")]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The toolchain's build invocation, selected by `cleanbuild × multiarch`.
/// The packaging toolchain itself is external, so these are supplied as
/// configured shell fragments rather than hardcoded against one build
/// tool's CLI.
#[derive(Debug, Clone)]
pub struct BuildCommands {
    pub incremental: String,
    pub incremental_multiarch: String,
    pub clean: String,
    pub clean_multiarch: String,
}

impl BuildCommands {
    pub fn select(&self, cleanbuild: bool, multiarch: bool) -> &str {
        match (cleanbuild, multiarch) {
            (false, false) => &self.incremental,
            (false, true) => &self.incremental_multiarch,
            (true, false) => &self.clean,
            (true, true) => &self.clean_multiarch,
        }
    }
}

pub struct BuildExecutor<'a> {
    pub recipe_root: &'a Path,
    pub container: &'a ContainerShell,
    pub gpg: &'a Gpg,
    pub upload: &'a UploadClient,
    pub build_commands: &'a BuildCommands,
    pub package_suffix: &'a str,
    pub log_dir: &'a Path,
}

impl<'a> BuildExecutor<'a> {
    pub async fn execute(&self, job: &Job, recipe: &PackageConfig) -> Result<(), BuildError> {
        let recipe_dir = self.recipe_root.join(recipe.dirname.as_str());
        let is_multiarch = !job.multiarch.is_empty();

        self.clean_phase(&recipe_dir, &job.arch, is_multiarch, recipe.cleanbuild)?;

        for hook in &recipe.prebuild {
            self.run_hook_best_effort(&recipe_dir, &job.arch, recipe, hook, "prebuild")
                .await;
        }

        let build_config = SupervisorConfig::new(
            Duration::from_secs(recipe.timeout as u64 * 60),
            Duration::from_secs(60),
        )
        .with_log_file(self.log_dir.join(format!("{}-build.log", recipe.dirname)));
        let build_cmd = self.build_commands.select(recipe.cleanbuild, is_multiarch);
        if let Err(source) = self
            .container
            .run(&job.arch, Some(recipe.dirname.as_str()), build_cmd, "build", build_config)
            .await
        {
            for hook in &recipe.failure {
                self.run_hook_best_effort(&recipe_dir, &job.arch, recipe, hook, "failure")
                    .await;
            }
            return Err(BuildError::Build {
                dirname: recipe.dirname.to_string(),
                source,
            });
        }

        for hook in &recipe.postbuild {
            self.run_hook_best_effort(&recipe_dir, &job.arch, recipe, hook, "postbuild")
                .await;
        }

        let produced = scan_suffix(&recipe_dir, self.package_suffix)?;
        for artifact_path in &produced {
            self.gpg.sign(artifact_path).await?;
        }

        let files: Vec<UploadFile> = produced
            .iter()
            .flat_map(|path| {
                let sig = sig_path(path);
                [
                    UploadFile {
                        remote_name: remote_name_for(&sig),
                        local_path: sig,
                    },
                    UploadFile {
                        remote_name: remote_name_for(path),
                        local_path: path.clone(),
                    },
                ]
            })
            .collect();

        self.upload.upload(&files, false).await?;

        self.post_clean(&recipe_dir, &produced, is_multiarch, recipe.cleanbuild)?;

        Ok(())
    }

    /// Re-sign and re-upload whatever artifacts already sit in a recipe's
    /// directory, without running a build. Grounds the `force_upload`
    /// control-server RPC: an operator re-pushing artifacts a prior build
    /// already produced, e.g. after a failed upload.
    pub async fn upload_existing(&self, dirname: &str, overwrite: bool) -> Result<usize, BuildError> {
        let recipe_dir = self.recipe_root.join(dirname);
        let produced = scan_suffix(&recipe_dir, self.package_suffix)?;
        for artifact_path in &produced {
            let sig = sig_path(artifact_path);
            if !sig.exists() {
                self.gpg.sign(artifact_path).await?;
            }
        }
        let files: Vec<UploadFile> = produced
            .iter()
            .flat_map(|path| {
                let sig = sig_path(path);
                [
                    UploadFile {
                        remote_name: remote_name_for(&sig),
                        local_path: sig,
                    },
                    UploadFile {
                        remote_name: remote_name_for(path),
                        local_path: path.clone(),
                    },
                ]
            })
            .collect();
        self.upload.upload(&files, overwrite).await?;
        Ok(produced.len())
    }

    async fn run_hook_best_effort(
        &self,
        _recipe_dir: &Path,
        arch: &Arch,
        recipe: &PackageConfig,
        hook: &str,
        label: &str,
    ) {
        let config = SupervisorConfig::new(Duration::from_secs(600), Duration::from_secs(60));
        if let Err(err) = self
            .container
            .run(arch, Some(recipe.dirname.as_str()), hook, label, config)
            .await
        {
            tracing::warn!(dirname = %recipe.dirname, %label, %err, "hook failed, continuing");
        }
    }

    /// For a cleanbuild or multiarch job, wipe the in-tree build
    /// directories and every stale artifact for this arch (or all archs,
    /// for multiarch). Otherwise only the stale artifacts for this arch
    /// are removed; sources are left in place.
    fn clean_phase(
        &self,
        recipe_dir: &Path,
        arch: &Arch,
        is_multiarch: bool,
        cleanbuild: bool,
    ) -> Result<(), BuildError> {
        if is_multiarch || cleanbuild {
            for dir_name in ["pkg", "src"] {
                let dir = recipe_dir.join(dir_name);
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)
                        .map_err(|source| BuildError::Clean { path: dir, source })?;
                }
            }
        }
        for path in scan_suffix(recipe_dir, "")? {
            let Ok(artifact) = parse_artifact(path.file_name().and_then(|n| n.to_str()).unwrap_or(""))
            else {
                continue;
            };
            let matches_arch = is_multiarch || artifact.arch == *arch;
            if matches_arch {
                std::fs::remove_file(&path).map_err(|source| BuildError::Clean { path, source })?;
            }
        }
        Ok(())
    }

    fn post_clean(
        &self,
        recipe_dir: &Path,
        produced: &[PathBuf],
        is_multiarch: bool,
        cleanbuild: bool,
    ) -> Result<(), BuildError> {
        for path in produced {
            let sig = sig_path(path);
            for p in [path.clone(), sig] {
                if p.exists() {
                    std::fs::remove_file(&p).map_err(|source| BuildError::Clean { path: p, source })?;
                }
            }
        }
        if is_multiarch || cleanbuild {
            for dir_name in ["pkg", "src"] {
                let dir = recipe_dir.join(dir_name);
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)
                        .map_err(|source| BuildError::Clean { path: dir, source })?;
                }
            }
        }
        Ok(())
    }
}

fn sig_path(artifact_path: &Path) -> PathBuf {
    let mut name = artifact_path.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}

fn scan_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, BuildError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let read = std::fs::read_dir(dir).map_err(|source| BuildError::Clean {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut found = Vec::new();
    for entry in read.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with(".sig") {
            continue;
        }
        if suffix.is_empty() || name.ends_with(suffix) {
            if parse_artifact(name).is_ok() {
                found.push(path);
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_selection_covers_all_four_combinations() {
        let commands = BuildCommands {
            incremental: "i".to_string(),
            incremental_multiarch: "im".to_string(),
            clean: "c".to_string(),
            clean_multiarch: "cm".to_string(),
        };
        assert_eq!(commands.select(false, false), "i");
        assert_eq!(commands.select(false, true), "im");
        assert_eq!(commands.select(true, false), "c");
        assert_eq!(commands.select(true, true), "cm");
    }

    #[test]
    fn scan_suffix_ignores_signature_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("foo-1.0-1-x86_64.pkg.tar.xz"), b"x").unwrap();
        std::fs::write(tmp.path().join("foo-1.0-1-x86_64.pkg.tar.xz.sig"), b"x").unwrap();
        let found = scan_suffix(tmp.path(), "pkg.tar.xz").unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn clean_phase_in_place_build_keeps_sources_and_other_arch_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let recipe_dir = tmp.path();
        std::fs::create_dir(recipe_dir.join("src")).unwrap();
        std::fs::write(recipe_dir.join("foo-1.0-1-x86_64.pkg.tar.xz"), b"x").unwrap();
        std::fs::write(recipe_dir.join("foo-1.0-1-aarch64.pkg.tar.xz"), b"x").unwrap();

        // Exercise the static cleanup rule directly (no container needed).
        let arch = Arch::new("x86_64");
        let keep_other_arch = recipe_dir.join("foo-1.0-1-aarch64.pkg.tar.xz");
        let remove_this_arch = recipe_dir.join("foo-1.0-1-x86_64.pkg.tar.xz");

        for path in scan_suffix(recipe_dir, "").unwrap() {
            let name = path.file_name().unwrap().to_str().unwrap();
            let artifact = parse_artifact(name).unwrap();
            if artifact.arch == arch {
                std::fs::remove_file(&path).unwrap();
            }
        }

        assert!(!remove_this_arch.exists());
        assert!(keep_other_arch.exists());
        assert!(recipe_dir.join("src").exists());
    }
}
