// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-tick upstream version scan: walk every recipe, compare against the
//! ledger, and enqueue a build for each one that has advanced. A failure
//! partway through one recipe is logged and never aborts the rest of the
//! scan. The external packaging toolchain's "fetch version" and "list
//! artifacts" commands are injected as configured shell command strings
//! rather than hardcoded against one toolchain's CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use packhouse_adapters::{ContainerShell, SupervisorConfig, SupervisorError};
use packhouse_core::{
    Arch, ArchMapping, CheckOutcome, Clock, Dirname, Job, VersionCompare, VersionCompareError,
    VersionLedger,
};
use packhouse_recipe::{declared_archs, PackageConfig, RecipeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateCheckError {
    #[error("reading build file {path}: {source}")]
    ReadBuildFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("recipe declares no build-capable architecture")]
    NoBuildableArch,
    #[error(transparent)]
    Container(#[from] packhouse_adapters::ContainerShellError),
    #[error(transparent)]
    VersionCompare(#[from] VersionCompareError),
    #[error("toolchain reported no artifacts")]
    NoArtifactsReported,
}

/// The external toolchain's command surface, as shell fragments run
/// inside the recipe's container working directory. `{dirname}` is not
/// substituted here — the commands are expected to already operate on
/// the current working directory the container shell `cd`s into.
#[derive(Debug, Clone)]
pub struct ToolchainCommands {
    /// Relative path (within a recipe's directory) of its build file,
    /// e.g. `PKGBUILD`.
    pub build_file_name: String,
    /// Fetches sources and computes the version; run after the recipe's
    /// own `update` hooks.
    pub fetch_version_command: String,
    /// Prints the artifact filenames this recipe would produce, one per
    /// line; `+`-prefixed lines are diagnostic chatter to be stripped.
    pub list_artifacts_command: String,
    pub package_suffix: String,
}

/// Outcome of scanning one recipe.
#[derive(Debug)]
pub enum RecipeScanResult {
    Enqueued(Job),
    UpToDate,
    DowngradeAttempted,
    Skipped { reason: String },
    Failed { error: String },
}

pub struct UpdateDetector<'a> {
    pub recipe_root: &'a Path,
    pub archs: &'a ArchMapping,
    pub container: &'a ContainerShell,
    pub toolchain: &'a ToolchainCommands,
    pub log_dir: &'a Path,
    pub update_check_timeout: Duration,
    pub clock: &'a dyn Clock,
}

impl<'a> UpdateDetector<'a> {
    /// Scan every recipe in `recipes`, comparing against `ledger`, and
    /// return one result per recipe actually scanned. `targeted`
    /// restricts the scan to one recipe and forces `has_update = true`.
    ///
    /// The caller is responsible for persisting `ledger` afterward — this
    /// function only mutates the in-memory view so the persistence
    /// failure mode stays a separate, visible step.
    pub async fn scan(
        &self,
        ledger: &mut VersionLedger,
        recipes: &RecipeSet,
        cmp: &dyn VersionCompare,
        targeted: Option<&Dirname>,
    ) -> Vec<(Dirname, RecipeScanResult)> {
        let mut results = Vec::new();
        for recipe in recipes.iter() {
            if let Some(only) = targeted {
                if &recipe.dirname != only {
                    continue;
                }
            }
            let is_targeted = targeted == Some(&recipe.dirname);

            if !is_targeted && ledger.is_quarantined(recipe.dirname.as_str()) {
                results.push((
                    recipe.dirname.clone(),
                    RecipeScanResult::Skipped {
                        reason: "quarantined after repeated update-check failures".to_string(),
                    },
                ));
                continue;
            }

            match self.scan_one(ledger, recipe, cmp, is_targeted).await {
                Ok(outcome) => {
                    if matches!(outcome, RecipeScanResult::Enqueued(_)) {
                        ledger.clear_failures(recipe.dirname.as_str());
                    }
                    results.push((recipe.dirname.clone(), outcome));
                }
                Err(err) => {
                    ledger.record_check_failure(recipe.dirname.as_str());
                    results.push((
                        recipe.dirname.clone(),
                        RecipeScanResult::Failed {
                            error: err.to_string(),
                        },
                    ));
                }
            }
        }
        results
    }

    async fn scan_one(
        &self,
        ledger: &mut VersionLedger,
        recipe: &PackageConfig,
        cmp: &dyn VersionCompare,
        targeted: bool,
    ) -> Result<RecipeScanResult, UpdateCheckError> {
        let recipe_dir = self.recipe_root.join(recipe.dirname.as_str());
        let build_file = recipe_dir.join(&self.toolchain.build_file_name);
        let contents =
            std::fs::read_to_string(&build_file).map_err(|source| UpdateCheckError::ReadBuildFile {
                path: build_file.clone(),
                source,
            })?;
        let declared = declared_archs(&contents);
        let mapped = self.archs.map_all(&declared);
        if mapped.is_empty() {
            return Ok(RecipeScanResult::Skipped {
                reason: "no build-capable architecture mapped from the recipe's declared arch list"
                    .to_string(),
            });
        }
        let representative = self
            .archs
            .representative(&mapped)
            .ok_or(UpdateCheckError::NoBuildableArch)?
            .clone();

        let log_file = self
            .log_dir
            .join(format!("{}-update.log", recipe.dirname.as_str()));
        let config = SupervisorConfig::new(self.update_check_timeout, Duration::from_secs(300))
            .with_log_file(log_file);

        for hook in &recipe.update {
            if let Err(err) = self
                .container
                .run(
                    &representative,
                    Some(recipe.dirname.as_str()),
                    hook,
                    "update-hook",
                    config.clone(),
                )
                .await
            {
                tracing::warn!(dirname = %recipe.dirname, %err, "update hook failed, continuing");
            }
        }

        self.container
            .run(
                &representative,
                Some(recipe.dirname.as_str()),
                &self.toolchain.fetch_version_command,
                "fetch-version",
                config.clone(),
            )
            .await?;

        let listed = self
            .container
            .run(
                &representative,
                Some(recipe.dirname.as_str()),
                &self.toolchain.list_artifacts_command,
                "list-artifacts",
                config,
            )
            .await?;

        let artifact_name = listed
            .tail
            .lines()
            .filter(|line| !line.starts_with('+'))
            .find(|line| !line.trim().is_empty())
            .ok_or(UpdateCheckError::NoArtifactsReported)?
            .trim();
        let artifact = packhouse_core::parse_artifact(artifact_name)
            .map_err(|_| UpdateCheckError::NoArtifactsReported)?;
        let observed = artifact.ver();

        let outcome = ledger
            .record_check(cmp, recipe.dirname.as_str(), &observed, targeted)
            .await?;

        match outcome {
            CheckOutcome::DowngradeRejected => {
                tracing::warn!(dirname = %recipe.dirname, version = %observed, "downgrade attempted");
                Ok(RecipeScanResult::DowngradeAttempted)
            }
            CheckOutcome::Advanced(version) => {
                let multiarch: Vec<Arch> = mapped
                    .iter()
                    .filter(|a| **a != representative)
                    .cloned()
                    .collect();
                Ok(RecipeScanResult::Enqueued(Job::with_priority(
                    recipe.dirname.clone(),
                    representative,
                    version,
                    multiarch,
                    self.clock.now_secs(),
                    recipe.priority,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packhouse_core::{SystemClock, Version};
    use packhouse_recipe::RawRecipe;
    use std::cell::Cell;
    use std::cmp::Ordering;
    use std::collections::BTreeMap;

    struct FixedCompare(Cell<Ordering>);

    #[async_trait::async_trait]
    impl VersionCompare for FixedCompare {
        async fn compare(&self, _a: &Version, _b: &Version) -> Result<Ordering, VersionCompareError> {
            Ok(self.0.get())
        }
    }

    fn unreachable_container() -> ContainerShell {
        // Points at a binary that does not exist; any test that reaches
        // a `container.run()` call would fail loudly instead of hanging.
        ContainerShell::new(
            PathBuf::from("/container-root"),
            vec!["/nonexistent-x86-wrapper".to_string()],
            vec!["/nonexistent-arm-wrapper".to_string()],
        )
    }

    fn mapping_with_no_build_capable_archs() -> ArchMapping {
        let mut table = BTreeMap::new();
        table.insert(Arch::new("armv7h"), None);
        ArchMapping::new(table, Arch::new("x86_64"))
    }

    #[tokio::test]
    async fn recipe_with_unmapped_archs_is_skipped_before_touching_the_container() {
        let tmp = tempfile::tempdir().unwrap();
        let dirname = Dirname::new("foo");
        let recipe_dir = tmp.path().join(dirname.as_str());
        std::fs::create_dir_all(&recipe_dir).unwrap();
        std::fs::write(recipe_dir.join("PKGBUILD"), "arch=(armv7h)\n").unwrap();

        let toolchain = ToolchainCommands {
            build_file_name: "PKGBUILD".to_string(),
            fetch_version_command: "true".to_string(),
            list_artifacts_command: "true".to_string(),
            package_suffix: "pkg.tar.xz".to_string(),
        };
        let archs = mapping_with_no_build_capable_archs();
        let container = unreachable_container();
        let clock = SystemClock;
        let detector = UpdateDetector {
            recipe_root: tmp.path(),
            archs: &archs,
            container: &container,
            toolchain: &toolchain,
            log_dir: tmp.path(),
            update_check_timeout: Duration::from_secs(60),
            clock: &clock,
        };

        let cfg = PackageConfig::from_raw(dirname.clone(), RawRecipe::default());
        let (set, _) = RecipeSet::from_loaded(vec![packhouse_recipe::LoadedRecipe::Ok(cfg)]);
        let mut ledger = VersionLedger::new();
        let cmp = packhouse_adapters::ExternalVercmp::default();

        let results = detector.scan(&mut ledger, &set, &cmp, None).await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, RecipeScanResult::Skipped { .. }));
    }

    #[tokio::test]
    async fn quarantined_recipe_is_skipped_on_non_targeted_scans() {
        let tmp = tempfile::tempdir().unwrap();
        let dirname = Dirname::new("flaky");
        std::fs::create_dir_all(tmp.path().join(dirname.as_str())).unwrap();

        let toolchain = ToolchainCommands {
            build_file_name: "PKGBUILD".to_string(),
            fetch_version_command: "true".to_string(),
            list_artifacts_command: "true".to_string(),
            package_suffix: "pkg.tar.xz".to_string(),
        };
        let archs = mapping_with_no_build_capable_archs();
        let container = unreachable_container();
        let clock = SystemClock;
        let detector = UpdateDetector {
            recipe_root: tmp.path(),
            archs: &archs,
            container: &container,
            toolchain: &toolchain,
            log_dir: tmp.path(),
            update_check_timeout: Duration::from_secs(60),
            clock: &clock,
        };

        let cfg = PackageConfig::from_raw(dirname.clone(), RawRecipe::default());
        let (set, _) = RecipeSet::from_loaded(vec![packhouse_recipe::LoadedRecipe::Ok(cfg)]);
        let mut ledger = VersionLedger::new();
        ledger.record_check_failure(dirname.as_str());
        ledger.record_check_failure(dirname.as_str());
        let cmp = packhouse_adapters::ExternalVercmp::default();

        let results = detector.scan(&mut ledger, &set, &cmp, None).await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, RecipeScanResult::Skipped { .. }));
    }

    #[tokio::test]
    async fn downgrade_with_nonzero_failures_leaves_the_counter_untouched_through_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let dirname = Dirname::new("foo");
        let recipe_dir = tmp.path().join(dirname.as_str());
        std::fs::create_dir_all(&recipe_dir).unwrap();
        std::fs::write(recipe_dir.join("PKGBUILD"), "arch=(x86_64)\n").unwrap();

        let toolchain = ToolchainCommands {
            build_file_name: "PKGBUILD".to_string(),
            fetch_version_command: "true".to_string(),
            list_artifacts_command: "echo 'foo-1.0-1-x86_64.pkg.tar.xz'".to_string(),
            package_suffix: "pkg.tar.xz".to_string(),
        };
        let mut table = BTreeMap::new();
        table.insert(Arch::new("x86_64"), Some(Arch::new("x86_64")));
        let archs = ArchMapping::new(table, Arch::new("x86_64"));
        let container = ContainerShell::new(
            tmp.path().to_path_buf(),
            vec!["/bin/sh".to_string(), "-c".to_string()],
            vec!["/bin/sh".to_string(), "-c".to_string()],
        );
        let clock = SystemClock;
        let detector = UpdateDetector {
            recipe_root: tmp.path(),
            archs: &archs,
            container: &container,
            toolchain: &toolchain,
            log_dir: tmp.path(),
            update_check_timeout: Duration::from_secs(10),
            clock: &clock,
        };

        let cfg = PackageConfig::from_raw(dirname.clone(), RawRecipe::default());
        let (set, _) = RecipeSet::from_loaded(vec![packhouse_recipe::LoadedRecipe::Ok(cfg)]);

        let mut ledger = VersionLedger::new();
        let cmp = FixedCompare(Cell::new(Ordering::Greater));
        ledger
            .record_check(&cmp, dirname.as_str(), &Version::new("2.0-1"), false)
            .await
            .unwrap();
        ledger.record_check_failure(dirname.as_str());
        assert_eq!(ledger.entry(dirname.as_str()).failures, 1);

        cmp.0.set(Ordering::Less);
        let results = detector.scan(&mut ledger, &set, &cmp, None).await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, RecipeScanResult::DowngradeAttempted));
        assert_eq!(ledger.entry(dirname.as_str()).failures, 1);
    }
}
