// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `PackageConfig`: the parsed, defaulted form of a recipe's
//! `autobuild.yaml`.

use packhouse_core::Dirname;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeType {
    Git,
    Manual,
}

impl std::fmt::Display for RecipeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipeType::Git => write!(f, "git"),
            RecipeType::Manual => write!(f, "manual"),
        }
    }
}

/// The raw shape of `autobuild.yaml`, before defaulting. Every field is
/// optional since the file may omit any of them (`yamlparse.py` reads
/// with `content.get(part, None)` throughout).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecipe {
    #[serde(rename = "type")]
    pub recipe_type: Option<String>,
    pub cleanbuild: Option<bool>,
    pub timeout: Option<u32>,
    pub priority: Option<i32>,
    #[serde(default)]
    pub extra: Vec<std::collections::BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageConfig {
    pub dirname: Dirname,
    pub recipe_type: RecipeType,
    pub cleanbuild: bool,
    /// Build timeout, in minutes.
    pub timeout: u32,
    pub priority: i32,
    pub prebuild: Vec<String>,
    pub postbuild: Vec<String>,
    pub update: Vec<String>,
    pub failure: Vec<String>,
}

impl PackageConfig {
    /// Apply `yamlparse.py::pkgConfig`'s defaulting rules to a raw,
    /// possibly-partial recipe document.
    pub fn from_raw(dirname: Dirname, raw: RawRecipe) -> Self {
        let recipe_type = determine_type(raw.recipe_type.as_deref(), dirname.as_str());
        let cleanbuild = raw.cleanbuild.unwrap_or(true);
        let timeout = raw.timeout.unwrap_or(30);
        let priority = raw.priority.unwrap_or(0);

        let mut prebuild = Vec::new();
        let mut postbuild = Vec::new();
        let mut update = Vec::new();
        let mut failure = Vec::new();
        for entry in &raw.extra {
            if let Some(cmds) = entry.get("prebuild") {
                prebuild = cmds.clone();
            }
            if let Some(cmds) = entry.get("postbuild") {
                postbuild = cmds.clone();
            }
            if let Some(cmds) = entry.get("update") {
                update = cmds.clone();
            }
            if let Some(cmds) = entry.get("failure") {
                failure = cmds.clone();
            }
        }

        Self {
            dirname,
            recipe_type,
            cleanbuild,
            timeout,
            priority,
            prebuild,
            postbuild,
            update,
            failure,
        }
    }
}

/// `auto`/absent resolves to `git` iff the dirname ends in `-git`, else
/// `manual`; any other explicit value also resolves to `manual`
/// (`yamlparse.py::__determine_type`: anything that isn't handled by the
/// `-git` special case falls through to `manual`).
fn determine_type(declared: Option<&str>, dirname: &str) -> RecipeType {
    if matches!(declared, None | Some("auto")) && dirname.ends_with("-git") {
        return RecipeType::Git;
    }
    RecipeType::Manual
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_tool() {
        let cfg = PackageConfig::from_raw(Dirname::new("foo"), RawRecipe::default());
        assert_eq!(cfg.recipe_type, RecipeType::Manual);
        assert!(cfg.cleanbuild);
        assert_eq!(cfg.timeout, 30);
        assert_eq!(cfg.priority, 0);
        assert!(cfg.prebuild.is_empty());
    }

    #[test]
    fn dash_git_suffix_infers_git_type_when_unspecified() {
        let cfg = PackageConfig::from_raw(Dirname::new("foo-git"), RawRecipe::default());
        assert_eq!(cfg.recipe_type, RecipeType::Git);
    }

    #[test]
    fn explicit_manual_overrides_dash_git_suffix() {
        let raw = RawRecipe {
            recipe_type: Some("manual".to_string()),
            ..Default::default()
        };
        let cfg = PackageConfig::from_raw(Dirname::new("foo-git"), raw);
        assert_eq!(cfg.recipe_type, RecipeType::Manual);
    }

    #[test]
    fn extra_stages_are_collected_by_key() {
        let mut prebuild = std::collections::BTreeMap::new();
        prebuild.insert("prebuild".to_string(), vec!["echo hi".to_string()]);
        let mut failure = std::collections::BTreeMap::new();
        failure.insert("failure".to_string(), vec!["notify".to_string()]);
        let raw = RawRecipe {
            extra: vec![prebuild, failure],
            ..Default::default()
        };
        let cfg = PackageConfig::from_raw(Dirname::new("foo"), raw);
        assert_eq!(cfg.prebuild, vec!["echo hi".to_string()]);
        assert_eq!(cfg.failure, vec!["notify".to_string()]);
        assert!(cfg.postbuild.is_empty());
    }
}
