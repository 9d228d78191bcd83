// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version representation and the domain version-compare contract.
//!
//! `vercmp` itself is an external command; this module only defines the
//! `Version` newtype and the `VersionCompare` trait the rest of the
//! workspace programs against, so every caller is decoupled from how the
//! comparison is actually performed. `packhouse-adapters` provides the
//! concrete implementation that shells out to `vercmp`.

use std::cmp::Ordering;
use std::fmt;

/// A package version string in `pkgver-pkgrel` form (e.g. `1.2-1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Version(pub String);

impl Version {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors a version comparator implementation can report.
#[derive(Debug, thiserror::Error)]
pub enum VersionCompareError {
    #[error("version comparator command failed: {0}")]
    CommandFailed(String),
    #[error("version comparator returned unparseable result: {0}")]
    UnparseableResult(String),
}

/// The domain's canonical version-compare relation.
///
/// Implementations must return `Ordering::Greater` when `a` is newer than
/// `b`, matching `vercmp(a, b) == 1` in the original tool. Async because
/// the canonical implementation shells out to an external comparator.
#[async_trait::async_trait]
pub trait VersionCompare: Send + Sync {
    async fn compare(&self, a: &Version, b: &Version) -> Result<Ordering, VersionCompareError>;
}
