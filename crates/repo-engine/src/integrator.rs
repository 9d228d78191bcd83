// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Moves verified artifacts from `updates/` into the served tree and
//! keeps the per-arch index reconciled. Signature verification happens
//! upstream in the repo daemon's `push_done` handler, before an
//! `Integrator` is ever invoked.

use std::path::{Path, PathBuf};

use packhouse_adapters::RepoTools;
use packhouse_core::{parse_artifact, Arch, Clock, VersionCompare, VersionCompareError};
use packhouse_storage::{filter_old, quarantine, LayoutError, RepoLayout};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegratorError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    VersionCompare(#[from] VersionCompareError),
    #[error(transparent)]
    RepoTools(#[from] packhouse_adapters::RepoToolsError),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("destination {0} already exists and overwrite=false")]
    WouldOverwrite(PathBuf),
    #[error("regenerated tree is missing expected index file {0}")]
    MissingIndexFile(PathBuf),
}

pub struct Integrator<'a> {
    pub layout: &'a RepoLayout,
    pub archs: &'a [Arch],
    pub cmp: &'a dyn VersionCompare,
    pub repo_tools: &'a RepoTools,
    pub clock: &'a dyn Clock,
}

fn sig_path(p: &Path) -> PathBuf {
    let mut s = p.as_os_str().to_os_string();
    s.push(".sig");
    PathBuf::from(s)
}

impl<'a> Integrator<'a> {
    /// Integrate every verified artifact in `updates/` into the served
    /// tree, archiving what it replaces.
    pub async fn update(&self, overwrite: bool) -> Result<(), IntegratorError> {
        let staging = self.layout.updates_dir();

        filter_old(self.layout, &staging, self.cmp, 1, false, self.clock).await?;

        let entries: Vec<PathBuf> = std::fs::read_dir(&staging)
            .map_err(|source| IntegratorError::Io { path: staging.clone(), source })?
            .flatten()
            .map(|e| e.path())
            .collect();

        let mut affected_archs: Vec<Arch> = Vec::new();

        for path in &entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(".sig") {
                continue;
            }
            if !name.ends_with(self.layout.suffix()) {
                quarantine(self.layout, path, self.clock)?;
                continue;
            }
            let sig = sig_path(path);
            if !sig.exists() {
                quarantine(self.layout, path, self.clock)?;
                continue;
            }
            let Ok(artifact) = parse_artifact(name) else {
                quarantine(self.layout, path, self.clock)?;
                let _ = quarantine(self.layout, &sig, self.clock);
                continue;
            };

            let targets: Vec<Arch> = if artifact.arch.is_any() {
                self.archs.to_vec()
            } else {
                vec![artifact.arch.clone()]
            };

            for target in &targets {
                let dest_dir = self.layout.www_dir(target);
                std::fs::create_dir_all(&dest_dir).map_err(|source| IntegratorError::Io {
                    path: dest_dir.clone(),
                    source,
                })?;
                let dest = dest_dir.join(name);
                if !overwrite && dest.exists() {
                    return Err(IntegratorError::WouldOverwrite(dest));
                }
                std::fs::copy(path, &dest).map_err(|source| IntegratorError::Io {
                    path: dest.clone(),
                    source,
                })?;
                let dest_sig = dest_dir.join(sig.file_name().unwrap_or_default());
                std::fs::copy(&sig, &dest_sig).map_err(|source| IntegratorError::Io {
                    path: dest_sig,
                    source,
                })?;
                if !affected_archs.contains(target) {
                    affected_archs.push(target.clone());
                }
            }

            let archive_dest = self.layout.archive_dir().join(name);
            if archive_dest.exists() {
                quarantine(self.layout, &archive_dest, self.clock)?;
            }
            std::fs::rename(path, &archive_dest).map_err(|source| IntegratorError::Io {
                path: archive_dest,
                source,
            })?;
            let archive_sig_dest = self.layout.archive_dir().join(sig.file_name().unwrap_or_default());
            if archive_sig_dest.exists() {
                quarantine(self.layout, &archive_sig_dest, self.clock)?;
            }
            std::fs::rename(&sig, &archive_sig_dest).map_err(|source| IntegratorError::Io {
                path: archive_sig_dest,
                source,
            })?;

            if artifact.arch.is_any() {
                self.sync_any_symlinks()?;
            }
        }

        for arch in &affected_archs {
            self.run_repo_add(arch).await?;
        }

        Ok(())
    }

    /// Ensure every `any`-arch artifact has a matching symlink in every
    /// other configured arch's directory. A fast path used by both
    /// `regenerate` and inline by `update`.
    fn sync_any_symlinks(&self) -> Result<(), IntegratorError> {
        let any_dir = self.layout.www_any_dir();
        if !any_dir.exists() {
            return Ok(());
        }
        let any_files: Vec<PathBuf> = std::fs::read_dir(&any_dir)
            .map_err(|source| IntegratorError::Io { path: any_dir.clone(), source })?
            .flatten()
            .map(|e| e.path())
            .filter(|p| !p.is_symlink())
            .collect();

        for arch in self.archs.iter().filter(|a| !a.is_any()) {
            let dir = self.layout.www_dir(arch);
            std::fs::create_dir_all(&dir).map_err(|source| IntegratorError::Io {
                path: dir.clone(),
                source,
            })?;
            for any_file in &any_files {
                let name = any_file.file_name().unwrap_or_default();
                let link = dir.join(name);
                if link.exists() || link.symlink_metadata().is_ok() {
                    continue;
                }
                let target = PathBuf::from("..").join("any").join(name);
                #[cfg(unix)]
                std::os::unix::fs::symlink(&target, &link).map_err(|source| IntegratorError::Io {
                    path: link,
                    source,
                })?;
            }
        }
        Ok(())
    }

    async fn run_repo_add(&self, arch: &Arch) -> Result<(), IntegratorError> {
        let dir = self.layout.www_dir(arch);
        let db_path = dir.join("packhouse.db");
        let files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|source| IntegratorError::Io { path: dir.clone(), source })?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(self.layout.suffix()))
                    .unwrap_or(false)
            })
            .collect();
        self.repo_tools.add(&db_path, &files).await?;
        Ok(())
    }

    /// The authoritative reconciliation of the served tree against
    /// what's actually on disk.
    pub async fn regenerate(&self, archs: Option<&[Arch]>) -> Result<(), IntegratorError> {
        self.sync_any_symlinks()?;

        let targets: Vec<Arch> = archs.map(|a| a.to_vec()).unwrap_or_else(|| self.archs.to_vec());
        for arch in &targets {
            if arch.is_any() {
                continue;
            }
            let dir = self.layout.www_dir(arch);
            if !dir.exists() {
                continue;
            }
            filter_old(self.layout, &dir, self.cmp, 1, true, self.clock).await?;

            let entries: Vec<PathBuf> = std::fs::read_dir(&dir)
                .map_err(|source| IntegratorError::Io { path: dir.clone(), source })?
                .flatten()
                .map(|e| e.path())
                .collect();

            for path in &entries {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if path.symlink_metadata().map(|m| m.is_symlink()).unwrap_or(false) {
                    continue;
                }
                if name.ends_with(".sig") {
                    let artifact_name = name.trim_end_matches(".sig");
                    if !dir.join(artifact_name).exists() {
                        quarantine(self.layout, path, self.clock)?;
                    }
                    continue;
                }
                if !name.ends_with(self.layout.suffix()) {
                    quarantine(self.layout, path, self.clock)?;
                    continue;
                }
                let sig = sig_path(path);
                if !sig.exists() {
                    quarantine(self.layout, path, self.clock)?;
                    continue;
                }
                let Ok(artifact) = parse_artifact(name) else {
                    quarantine(self.layout, path, self.clock)?;
                    continue;
                };
                if !artifact.arch.is_any() && artifact.arch != *arch {
                    let correct_dir = self.layout.www_dir(&artifact.arch);
                    std::fs::create_dir_all(&correct_dir).map_err(|source| IntegratorError::Io {
                        path: correct_dir.clone(),
                        source,
                    })?;
                    std::fs::rename(path, correct_dir.join(name)).map_err(|source| IntegratorError::Io {
                        path: correct_dir,
                        source,
                    })?;
                }
            }

            self.run_repo_add(arch).await?;
            self.verify_index_files(arch)?;
        }
        Ok(())
    }

    fn verify_index_files(&self, arch: &Arch) -> Result<(), IntegratorError> {
        let dir = self.layout.www_dir(arch);
        for ext in ["db", "files"] {
            let path = dir.join(format!("packhouse.{ext}"));
            if !path.exists() {
                return Err(IntegratorError::MissingIndexFile(path));
            }
        }
        Ok(())
    }

    /// Remove every artifact whose pkgname is in `names` from the given
    /// archs (or all configured archs if `None`).
    pub async fn remove(&self, names: &[String], archs: Option<&[Arch]>) -> Result<(), IntegratorError> {
        let targets: Vec<Arch> = archs.map(|a| a.to_vec()).unwrap_or_else(|| self.archs.to_vec());
        for arch in &targets {
            let dir = self.layout.www_dir(arch);
            if !dir.exists() {
                continue;
            }
            let entries: Vec<PathBuf> = std::fs::read_dir(&dir)
                .map_err(|source| IntegratorError::Io { path: dir.clone(), source })?
                .flatten()
                .map(|e| e.path())
                .collect();

            let mut to_remove = Vec::new();
            for path in entries {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if name.ends_with(".sig") || !name.ends_with(self.layout.suffix()) {
                    continue;
                }
                let Ok(artifact) = parse_artifact(name) else {
                    continue;
                };
                if names.contains(&artifact.pkgname) {
                    to_remove.push((artifact.pkgname.clone(), path));
                }
            }
            if to_remove.is_empty() {
                continue;
            }
            let db_path = dir.join("packhouse.db");
            let pkgnames: Vec<String> = to_remove.iter().map(|(n, _)| n.clone()).collect();
            self.repo_tools.remove(&db_path, &pkgnames).await?;
            for (_, path) in to_remove {
                let sig = sig_path(&path);
                quarantine(self.layout, &path, self.clock)?;
                if sig.exists() {
                    quarantine(self.layout, &sig, self.clock)?;
                }
            }
        }
        Ok(())
    }

    /// Evict superseded artifacts from `archive/`, keeping `keep_new`
    /// newest per `(pkgname, arch)`.
    pub async fn clean_archive(&self, keep_new: usize) -> Result<Vec<PathBuf>, IntegratorError> {
        let archive = self.layout.archive_dir();
        Ok(filter_old(self.layout, &archive, self.cmp, keep_new, true, self.clock).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packhouse_core::SystemClock;
    use packhouse_core::Version;
    use std::cmp::Ordering;

    struct LexicalCompare;

    #[async_trait::async_trait]
    impl VersionCompare for LexicalCompare {
        async fn compare(&self, a: &Version, b: &Version) -> Result<Ordering, VersionCompareError> {
            Ok(a.as_str().cmp(b.as_str()))
        }
    }

    #[tokio::test]
    async fn update_rejects_overwrite_of_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(tmp.path(), "pkg.tar.xz");
        layout.ensure_dirs(&[Arch::new("x86_64")]).unwrap();

        std::fs::write(
            layout.updates_dir().join("foo-1.0-1-x86_64.pkg.tar.xz"),
            b"x",
        )
        .unwrap();
        std::fs::write(
            layout.updates_dir().join("foo-1.0-1-x86_64.pkg.tar.xz.sig"),
            b"x",
        )
        .unwrap();
        std::fs::write(
            layout.www_dir(&Arch::new("x86_64")).join("foo-1.0-1-x86_64.pkg.tar.xz"),
            b"existing",
        )
        .unwrap();

        let cmp = LexicalCompare;
        let clock = SystemClock;
        let repo_tools = RepoTools::new();
        let archs = vec![Arch::new("x86_64")];
        let integrator = Integrator {
            layout: &layout,
            archs: &archs,
            cmp: &cmp,
            repo_tools: &repo_tools,
            clock: &clock,
        };

        let err = integrator.update(false).await.unwrap_err();
        assert!(matches!(err, IntegratorError::WouldOverwrite(_)));
    }

    #[tokio::test]
    async fn unrecognized_staging_file_is_quarantined() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(tmp.path(), "pkg.tar.xz");
        layout.ensure_dirs(&[Arch::new("x86_64")]).unwrap();
        std::fs::write(layout.updates_dir().join("garbage.txt"), b"x").unwrap();

        let cmp = LexicalCompare;
        let clock = SystemClock;
        let repo_tools = RepoTools::new();
        let archs = vec![Arch::new("x86_64")];
        let integrator = Integrator {
            layout: &layout,
            archs: &archs,
            cmp: &cmp,
            repo_tools: &repo_tools,
            clock: &clock,
        };

        integrator.update(false).await.unwrap();
        assert!(layout.recycled_dir().join("garbage.txt").exists());
    }
}
