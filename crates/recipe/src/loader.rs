// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Walks a recipe-root directory and loads every `autobuild.yaml` found.
//! A bad or missing recipe in one subdirectory is logged and skipped
//! rather than aborting the whole walk.

use std::path::{Path, PathBuf};

use packhouse_core::Dirname;
use thiserror::Error;

use crate::config::{PackageConfig, RawRecipe};

pub const RECIPE_FILE_NAME: &str = "autobuild.yaml";

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read recipe root {path}: {source}")]
    ReadRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One recipe directory's load outcome: either a parsed config, or a
/// reason it was skipped.
#[derive(Debug)]
pub enum LoadedRecipe {
    Ok(PackageConfig),
    Skipped { dirname: Dirname, reason: String },
}

/// Walk `root`'s immediate subdirectories, skipping dotfiles, and parse
/// each one's `autobuild.yaml`. Directories with no recipe file, or with
/// one that fails to parse, are reported as `Skipped` rather than
/// aborting the walk.
pub fn load_all(root: &Path) -> Result<Vec<LoadedRecipe>, LoaderError> {
    let entries = std::fs::read_dir(root).map_err(|source| LoaderError::ReadRoot {
        path: root.to_path_buf(),
        source,
    })?;

    let mut loaded = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, root = %root.display(), "unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        loaded.push(load_one(&path, Dirname::new(name)));
    }
    Ok(loaded)
}

fn load_one(dir: &Path, dirname: Dirname) -> LoadedRecipe {
    let recipe_path = dir.join(RECIPE_FILE_NAME);
    let contents = match std::fs::read_to_string(&recipe_path) {
        Ok(c) => c,
        Err(err) => {
            return LoadedRecipe::Skipped {
                dirname,
                reason: format!("reading {}: {err}", recipe_path.display()),
            }
        }
    };
    let raw: RawRecipe = match serde_yaml::from_str(&contents) {
        Ok(r) => r,
        Err(err) => {
            return LoadedRecipe::Skipped {
                dirname,
                reason: format!("parsing {}: {err}", recipe_path.display()),
            }
        }
    };
    LoadedRecipe::Ok(PackageConfig::from_raw(dirname, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, contents: &str) {
        std::fs::write(dir.join(RECIPE_FILE_NAME), contents).unwrap();
    }

    #[test]
    fn loads_valid_recipes_and_skips_broken_ones() {
        let tmp = tempfile::tempdir().unwrap();

        let good = tmp.path().join("good-pkg");
        std::fs::create_dir(&good).unwrap();
        write(&good, "timeout: 45\n");

        let bad = tmp.path().join("bad-pkg");
        std::fs::create_dir(&bad).unwrap();
        write(&bad, "timeout: [this is not a number\n");

        let missing = tmp.path().join("missing-pkg");
        std::fs::create_dir(&missing).unwrap();

        let hidden = tmp.path().join(".git");
        std::fs::create_dir(&hidden).unwrap();

        let results = load_all(tmp.path()).unwrap();
        assert_eq!(results.len(), 3);

        let ok_count = results
            .iter()
            .filter(|r| matches!(r, LoadedRecipe::Ok(_)))
            .count();
        let skipped_count = results
            .iter()
            .filter(|r| matches!(r, LoadedRecipe::Skipped { .. }))
            .count();
        assert_eq!(ok_count, 1);
        assert_eq!(skipped_count, 2);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nonexistent");
        assert!(load_all(&missing).is_err());
    }
}
