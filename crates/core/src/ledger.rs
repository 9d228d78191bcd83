// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The version ledger's pure domain logic: monotonicity and quarantine.
//! File persistence (the `pkgver.json` atomic rewrite) lives in
//! `packhouse-storage`; this module only owns the compare-and-set and
//! failure-counter rules so they can be unit tested without touching disk.

use crate::version::{Version, VersionCompare, VersionCompareError};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One recipe's entry: `(last_built_version, consecutive_update_check_failures)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LedgerEntry {
    pub last_built_version: Option<Version>,
    pub failures: u32,
}

/// At or above this many consecutive update-check failures, automatic
/// checks skip the recipe.
pub const QUARANTINE_THRESHOLD: u32 = 2;

impl LedgerEntry {
    pub fn is_quarantined(&self) -> bool {
        self.failures >= QUARANTINE_THRESHOLD
    }
}

/// In-memory view of the whole `dirname -> entry` document.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VersionLedger(BTreeMap<String, LedgerEntry>);

/// Result of comparing a freshly observed version against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No prior version recorded, or the observed version is newer: the
    /// ledger is updated and a build should be enqueued.
    Advanced(Version),
    /// The observed version is not newer than the recorded one; logged as
    /// a downgrade attempt and ignored. This branch never touches the
    /// failure counter.
    DowngradeRejected,
}

impl VersionLedger {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn entry(&self, dirname: &str) -> LedgerEntry {
        self.0.get(dirname).cloned().unwrap_or_default()
    }

    /// Record an update-check result for `dirname` against `observed`,
    /// enforcing monotonicity. `targeted` bypasses the comparison
    /// entirely (a targeted rebuild always counts as an advance) but
    /// still writes through the same monotonic path.
    pub async fn record_check(
        &mut self,
        cmp: &dyn VersionCompare,
        dirname: &str,
        observed: &Version,
        targeted: bool,
    ) -> Result<CheckOutcome, VersionCompareError> {
        let mut entry = self.entry(dirname);
        let advanced = if targeted {
            true
        } else {
            match &entry.last_built_version {
                None => true,
                Some(old) => matches!(cmp.compare(observed, old).await?, Ordering::Greater),
            }
        };
        if advanced {
            entry.last_built_version = Some(observed.clone());
            self.0.insert(dirname.to_string(), entry);
            Ok(CheckOutcome::Advanced(observed.clone()))
        } else {
            Ok(CheckOutcome::DowngradeRejected)
        }
    }

    /// Increment the failure counter after an update-check-phase error.
    pub fn record_check_failure(&mut self, dirname: &str) {
        let mut entry = self.entry(dirname);
        entry.failures += 1;
        self.0.insert(dirname.to_string(), entry);
    }

    /// Clear the failure counter after a successful, non-downgrade check.
    pub fn clear_failures(&mut self, dirname: &str) {
        let mut entry = self.entry(dirname);
        if entry.failures != 0 {
            entry.failures = 0;
            self.0.insert(dirname.to_string(), entry);
        }
    }

    pub fn is_quarantined(&self, dirname: &str) -> bool {
        self.entry(dirname).is_quarantined()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LedgerEntry)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_map(self) -> BTreeMap<String, LedgerEntry> {
        self.0
    }

    pub fn from_map(map: BTreeMap<String, LedgerEntry>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedCompare(Cell<Ordering>);

    #[async_trait::async_trait]
    impl VersionCompare for FixedCompare {
        async fn compare(&self, _a: &Version, _b: &Version) -> Result<Ordering, VersionCompareError> {
            Ok(self.0.get())
        }
    }

    #[tokio::test]
    async fn first_observation_always_advances() {
        let mut ledger = VersionLedger::new();
        let cmp = FixedCompare(Cell::new(Ordering::Greater));
        let out = ledger
            .record_check(&cmp, "foo", &Version::new("1.0-1"), false)
            .await
            .unwrap();
        assert_eq!(out, CheckOutcome::Advanced(Version::new("1.0-1")));
        assert_eq!(
            ledger.entry("foo").last_built_version,
            Some(Version::new("1.0-1"))
        );
    }

    #[tokio::test]
    async fn downgrade_is_rejected_and_leaves_failures_untouched() {
        let mut ledger = VersionLedger::new();
        let cmp = FixedCompare(Cell::new(Ordering::Greater));
        ledger
            .record_check(&cmp, "bar", &Version::new("2.0-1"), false)
            .await
            .unwrap();
        cmp.0.set(Ordering::Less);
        let out = ledger
            .record_check(&cmp, "bar", &Version::new("1.9-1"), false)
            .await
            .unwrap();
        assert_eq!(out, CheckOutcome::DowngradeRejected);
        let entry = ledger.entry("bar");
        assert_eq!(entry.last_built_version, Some(Version::new("2.0-1")));
        assert_eq!(entry.failures, 0);
    }

    #[tokio::test]
    async fn downgrade_with_nonzero_failures_leaves_the_counter_untouched() {
        let mut ledger = VersionLedger::new();
        let cmp = FixedCompare(Cell::new(Ordering::Greater));
        ledger
            .record_check(&cmp, "bar", &Version::new("2.0-1"), false)
            .await
            .unwrap();
        ledger.record_check_failure("bar");
        assert_eq!(ledger.entry("bar").failures, 1);

        cmp.0.set(Ordering::Less);
        let out = ledger
            .record_check(&cmp, "bar", &Version::new("1.9-1"), false)
            .await
            .unwrap();
        assert_eq!(out, CheckOutcome::DowngradeRejected);
        assert_eq!(ledger.entry("bar").failures, 1);
    }

    #[tokio::test]
    async fn targeted_rebuild_forces_advance_regardless_of_comparison() {
        let mut ledger = VersionLedger::new();
        let cmp = FixedCompare(Cell::new(Ordering::Greater));
        ledger
            .record_check(&cmp, "baz", &Version::new("2.0-1"), false)
            .await
            .unwrap();
        cmp.0.set(Ordering::Less);
        let out = ledger
            .record_check(&cmp, "baz", &Version::new("1.9-1"), true)
            .await
            .unwrap();
        assert_eq!(out, CheckOutcome::Advanced(Version::new("1.9-1")));
    }

    #[test]
    fn quarantine_kicks_in_at_threshold() {
        let mut ledger = VersionLedger::new();
        ledger.record_check_failure("flaky");
        assert!(!ledger.is_quarantined("flaky"));
        ledger.record_check_failure("flaky");
        assert!(ledger.is_quarantined("flaky"));
    }

    #[test]
    fn successful_check_clears_failures() {
        let mut ledger = VersionLedger::new();
        ledger.record_check_failure("foo");
        ledger.clear_failures("foo");
        assert_eq!(ledger.entry("foo").failures, 0);
    }
}
