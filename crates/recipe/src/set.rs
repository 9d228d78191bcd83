// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RecipeSet`: the loaded, validated collection of recipes keyed by
//! `dirname`, as returned by [`crate::load_all`] once parse failures are
//! filtered out.

use std::collections::BTreeMap;

use packhouse_core::Dirname;

use crate::config::PackageConfig;
use crate::loader::LoadedRecipe;

#[derive(Debug, Clone, Default)]
pub struct RecipeSet(BTreeMap<Dirname, PackageConfig>);

impl RecipeSet {
    /// Partition a raw load-all walk into a usable set plus the skip
    /// reasons, preserving load order within the set.
    pub fn from_loaded(loaded: Vec<LoadedRecipe>) -> (Self, Vec<(Dirname, String)>) {
        let mut set = BTreeMap::new();
        let mut skipped = Vec::new();
        for item in loaded {
            match item {
                LoadedRecipe::Ok(cfg) => {
                    set.insert(cfg.dirname.clone(), cfg);
                }
                LoadedRecipe::Skipped { dirname, reason } => {
                    skipped.push((dirname, reason));
                }
            }
        }
        (Self(set), skipped)
    }

    pub fn get(&self, dirname: &Dirname) -> Option<&PackageConfig> {
        self.0.get(dirname)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageConfig> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_ok_and_skipped() {
        let loaded = vec![
            LoadedRecipe::Ok(PackageConfig::from_raw(
                Dirname::new("foo"),
                crate::config::RawRecipe::default(),
            )),
            LoadedRecipe::Skipped {
                dirname: Dirname::new("bar"),
                reason: "bad yaml".to_string(),
            },
        ];
        let (set, skipped) = RecipeSet::from_loaded(loaded);
        assert_eq!(set.len(), 1);
        assert!(set.get(&Dirname::new("foo")).is_some());
        assert_eq!(skipped.len(), 1);
    }
}
