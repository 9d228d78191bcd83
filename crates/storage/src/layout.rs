// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Served-repository filesystem layout and version filtering (`filter_old`).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use packhouse_core::{parse_artifact, Arch, Artifact, Clock, VersionCompare, VersionCompareError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("listing {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("moving {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    VersionCompare(#[from] VersionCompareError),
}

/// Owns the root of a served repository tree and the package-suffix
/// convention used to recognize artifact files in it.
#[derive(Debug, Clone)]
pub struct RepoLayout {
    root: PathBuf,
    suffix: String,
}

impl RepoLayout {
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
        }
    }

    pub fn updates_dir(&self) -> PathBuf {
        self.root.join("updates")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    pub fn recycled_dir(&self) -> PathBuf {
        self.root.join("recycled")
    }

    pub fn www_dir(&self, arch: &Arch) -> PathBuf {
        self.root.join("www").join(arch.as_str())
    }

    pub fn www_any_dir(&self) -> PathBuf {
        self.www_dir(&Arch::any())
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Create every directory this layout names, if absent.
    pub fn ensure_dirs(&self, archs: &[Arch]) -> std::io::Result<()> {
        std::fs::create_dir_all(self.updates_dir())?;
        std::fs::create_dir_all(self.archive_dir())?;
        std::fs::create_dir_all(self.recycled_dir())?;
        for arch in archs {
            std::fs::create_dir_all(self.www_dir(arch))?;
        }
        Ok(())
    }
}

/// Quarantine (atomic rename, never delete-in-place) a file into
/// `recycled/`, suffixing its name with the current Unix timestamp to
/// avoid collisions.
pub fn quarantine(
    layout: &RepoLayout,
    file: &Path,
    clock: &dyn Clock,
) -> Result<PathBuf, LayoutError> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed");
    let dest = layout
        .recycled_dir()
        .join(format!("{name}_{}", clock.now_secs()));
    std::fs::rename(file, &dest).map_err(|source| LayoutError::Move {
        from: file.to_path_buf(),
        to: dest.clone(),
        source,
    })?;
    Ok(dest)
}

/// A directory entry recognized as a package artifact (or its signature).
struct Entry {
    path: PathBuf,
    artifact: Artifact,
    is_symlink: bool,
}

fn scan_artifacts(dir: &Path, suffix: &str) -> Result<Vec<Entry>, LayoutError> {
    let read = std::fs::read_dir(dir).map_err(|source| LayoutError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut entries = Vec::new();
    for item in read {
        let item = match item {
            Ok(i) => i,
            Err(_) => continue,
        };
        let path = item.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(suffix) {
            continue;
        }
        let Ok(artifact) = parse_artifact(name) else {
            continue;
        };
        let is_symlink = path.symlink_metadata().map(|m| m.is_symlink()).unwrap_or(false);
        entries.push(Entry {
            path,
            artifact,
            is_symlink,
        });
    }
    Ok(entries)
}

/// Stable descending insertion sort by version, using the async domain
/// comparator (small groups, so the quadratic cost is irrelevant).
async fn sort_desc(entries: &mut [Entry], cmp: &dyn VersionCompare) -> Result<(), LayoutError> {
    for i in 1..entries.len() {
        let mut j = i;
        while j > 0 {
            let ord = cmp
                .compare(&entries[j].artifact.ver(), &entries[j - 1].artifact.ver())
                .await?;
            if ord == Ordering::Greater {
                entries.swap(j, j - 1);
                j -= 1;
            } else {
                break;
            }
        }
    }
    Ok(())
}

/// Move a file (and its `.sig`, if present) into `archive/`, quarantining
/// any existing same-named file there first.
fn archive_one(
    layout: &RepoLayout,
    entry: &Entry,
    clock: &dyn Clock,
) -> Result<(), LayoutError> {
    let dest = layout.archive_dir().join(entry.path.file_name().unwrap_or_default());
    if dest.exists() {
        quarantine(layout, &dest, clock)?;
    }
    std::fs::rename(&entry.path, &dest).map_err(|source| LayoutError::Move {
        from: entry.path.clone(),
        to: dest,
        source,
    })?;
    move_sig_alongside(layout.suffix(), &entry.path, &layout.archive_dir(), layout, clock)
}

fn recycle_one(layout: &RepoLayout, entry: &Entry, clock: &dyn Clock) -> Result<(), LayoutError> {
    quarantine(layout, &entry.path, clock)?;
    let sig = sig_path(&entry.path, layout.suffix());
    if sig.exists() {
        quarantine(layout, &sig, clock)?;
    }
    Ok(())
}

fn sig_path(artifact_path: &Path, suffix: &str) -> PathBuf {
    let _ = suffix;
    let mut name = artifact_path.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}

fn move_sig_alongside(
    suffix: &str,
    artifact_path: &Path,
    dest_dir: &Path,
    layout: &RepoLayout,
    clock: &dyn Clock,
) -> Result<(), LayoutError> {
    let sig = sig_path(artifact_path, suffix);
    if !sig.exists() {
        return Ok(());
    }
    let dest = dest_dir.join(sig.file_name().unwrap_or_default());
    if dest.exists() {
        quarantine(layout, &dest, clock)?;
    }
    std::fs::rename(&sig, &dest).map_err(|source| LayoutError::Move {
        from: sig,
        to: dest,
        source,
    })
}

/// Evict superseded versions from `dir`: keep the `keep_new` newest
/// artifacts per `(pkgname, arch)` and move the rest out, either to
/// `archive/` or to `recycled/` depending on `recycle`. Symlinks are
/// always recycled, never archived.
///
/// Returns the paths of everything that was moved out of `dir`.
pub async fn filter_old(
    layout: &RepoLayout,
    dir: &Path,
    cmp: &dyn VersionCompare,
    keep_new: usize,
    recycle: bool,
    clock: &dyn Clock,
) -> Result<Vec<PathBuf>, LayoutError> {
    let entries = scan_artifacts(dir, layout.suffix())?;

    let mut groups: BTreeMap<(String, String), Vec<Entry>> = BTreeMap::new();
    for entry in entries {
        let key = (entry.artifact.pkgname.clone(), entry.artifact.arch.to_string());
        groups.entry(key).or_default().push(entry);
    }

    let mut moved = Vec::new();
    for (_, mut group) in groups {
        sort_desc(&mut group, cmp).await?;
        for (idx, entry) in group.into_iter().enumerate() {
            if idx < keep_new {
                continue;
            }
            moved.push(entry.path.clone());
            if entry.is_symlink || recycle {
                recycle_one(layout, &entry, clock)?;
            } else {
                archive_one(layout, &entry, clock)?;
            }
        }
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use packhouse_core::{SystemClock, Version};
    use std::cmp::Ordering as StdOrdering;

    struct LexicalCompare;

    #[async_trait::async_trait]
    impl VersionCompare for LexicalCompare {
        async fn compare(&self, a: &Version, b: &Version) -> Result<StdOrdering, VersionCompareError> {
            Ok(a.as_str().cmp(b.as_str()))
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[tokio::test]
    async fn keeps_only_newest_per_pkgname_arch() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(tmp.path(), "pkg.tar.xz");
        layout.ensure_dirs(&[Arch::new("x86_64")]).unwrap();

        let working = tmp.path().join("work");
        std::fs::create_dir(&working).unwrap();
        touch(&working, "foo-1.0-1-x86_64.pkg.tar.xz");
        touch(&working, "foo-1.1-1-x86_64.pkg.tar.xz");

        let cmp = LexicalCompare;
        let clock = SystemClock;
        let moved = filter_old(&layout, &working, &cmp, 1, false, &clock)
            .await
            .unwrap();

        assert_eq!(moved.len(), 1);
        assert!(!working.join("foo-1.0-1-x86_64.pkg.tar.xz").exists());
        assert!(working.join("foo-1.1-1-x86_64.pkg.tar.xz").exists());
        assert!(layout
            .archive_dir()
            .join("foo-1.0-1-x86_64.pkg.tar.xz")
            .exists());
    }

    #[tokio::test]
    async fn symlinks_are_always_recycled_even_when_recycle_is_false() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(tmp.path(), "pkg.tar.xz");
        layout.ensure_dirs(&[Arch::new("x86_64")]).unwrap();

        let working = tmp.path().join("work");
        std::fs::create_dir(&working).unwrap();
        touch(&working, "foo-1.0-1-x86_64.pkg.tar.xz");
        let real = working.join("foo-1.0-1-x86_64.pkg.tar.xz");
        let link = working.join("foo-0.9-1-x86_64.pkg.tar.xz");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let cmp = LexicalCompare;
        let clock = SystemClock;
        filter_old(&layout, &working, &cmp, 1, false, &clock)
            .await
            .unwrap();

        assert!(!link.exists());
        assert!(!layout
            .archive_dir()
            .join("foo-0.9-1-x86_64.pkg.tar.xz")
            .exists());
    }

    #[test]
    fn quarantine_renames_into_recycled_with_timestamp_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(tmp.path(), "pkg.tar.xz");
        layout.ensure_dirs(&[]).unwrap();
        let file = tmp.path().join("stray.txt");
        std::fs::write(&file, b"x").unwrap();

        let clock = packhouse_core::FakeClock::new(42);
        let dest = quarantine(&layout, &file, &clock).unwrap();
        assert_eq!(dest, layout.recycled_dir().join("stray.txt_42"));
        assert!(dest.exists());
    }
}
