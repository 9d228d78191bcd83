// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact naming: `<pkgname>-<pkgver>-<pkgrel>-<arch>.<suffix>`.

use crate::arch::Arch;
use crate::version::Version;
use regex::Regex;
use std::sync::OnceLock;

/// A parsed artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub pkgname: String,
    pub pkgver: String,
    pub pkgrel: String,
    pub arch: Arch,
}

impl Artifact {
    /// `pkgver-pkgrel`, the unit the version-compare relation orders on.
    pub fn ver(&self) -> Version {
        Version::new(format!("{}-{}", self.pkgver, self.pkgrel))
    }

    /// Render the canonical filename for the given package suffix (e.g.
    /// `pkg.tar.xz`).
    pub fn filename(&self, suffix: &str) -> String {
        format!(
            "{}-{}-{}-{}.{}",
            self.pkgname, self.pkgver, self.pkgrel, self.arch, suffix
        )
    }

    pub fn sig_filename(&self, suffix: &str) -> String {
        format!("{}.sig", self.filename(suffix))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArtifactParseError {
    #[error("artifact filename does not match the expected pattern: {0}")]
    NoMatch(String),
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^(.+)-([^-]+)-([^-]+)-([^-]+)\.pkg\.tar\.\w+$").unwrap()
    })
}

/// Parse an artifact filename with a strict, greedy-pkgname regex.
///
/// Non-matching names (including bare signature files) are rejected rather
/// than guessed at.
pub fn parse(name: &str) -> Result<Artifact, ArtifactParseError> {
    let caps = pattern()
        .captures(name)
        .ok_or_else(|| ArtifactParseError::NoMatch(name.to_string()))?;
    Ok(Artifact {
        pkgname: caps[1].to_string(),
        pkgver: caps[2].to_string(),
        pkgrel: caps[3].to_string(),
        arch: Arch::new(&caps[4]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_well_formed_name() {
        let a = parse("foo-1.2-1-x86_64.pkg.tar.xz").unwrap();
        assert_eq!(a.pkgname, "foo");
        assert_eq!(a.pkgver, "1.2");
        assert_eq!(a.pkgrel, "1");
        assert_eq!(a.arch, Arch::new("x86_64"));
    }

    #[test]
    fn greedy_pkgname_absorbs_internal_dashes() {
        let a = parse("my-cool-app-1.2-1-any.pkg.tar.zst").unwrap();
        assert_eq!(a.pkgname, "my-cool-app");
        assert_eq!(a.arch, Arch::any());
    }

    #[test]
    fn rejects_non_matching_names() {
        assert!(parse("not-a-package.txt").is_err());
        assert!(parse("foo-1.2-1-x86_64.pkg.tar.xz.sig").is_err());
    }

    proptest! {
        #[test]
        fn parse_is_inverse_of_format(
            pkgname in "[a-z][a-z0-9]{0,12}",
            pkgver in "[0-9]+\\.[0-9]+",
            pkgrel in "[0-9]+",
            arch in "x86_64|aarch64|any",
        ) {
            let artifact = Artifact {
                pkgname: pkgname.clone(),
                pkgver: pkgver.clone(),
                pkgrel: pkgrel.clone(),
                arch: Arch::new(arch.clone()),
            };
            let name = artifact.filename("pkg.tar.xz");
            let parsed = parse(&name).unwrap();
            prop_assert_eq!(parsed, artifact);
        }
    }
}
