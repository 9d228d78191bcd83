// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Extracts a recipe's declared architecture list from its build file.
//!
//! The build file is a shell-sourced `PKGBUILD`-style document with an
//! `arch=(...)` array; rather than sourcing the shell (which would
//! require running untrusted recipe code just to read metadata), this
//! parses the array textually the way `makepkg --printsrcinfo`-adjacent
//! tooling does for the common case.

use std::sync::OnceLock;

use packhouse_core::Arch;
use regex::Regex;

/// Match `arch=(...)`, tolerating surrounding whitespace and newlines
/// inside the parens.
fn arch_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"(?m)^\s*arch=\(([^)]*)\)").unwrap()
    })
}

/// Parse the `arch=(...)` array out of a PKGBUILD-style document.
pub fn declared_archs(contents: &str) -> Vec<Arch> {
    let Some(caps) = arch_pattern().captures(contents) else {
        return Vec::new();
    };
    caps[1]
        .split_whitespace()
        .map(|tok| tok.trim_matches(['"', '\'']))
        .filter(|tok| !tok.is_empty())
        .map(Arch::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_multi_arch_list() {
        let pkgbuild = "pkgname=foo\narch=('x86_64' 'aarch64')\npkgver=1.0\n";
        assert_eq!(
            declared_archs(pkgbuild),
            vec![Arch::new("x86_64"), Arch::new("aarch64")]
        );
    }

    #[test]
    fn parses_any_arch() {
        let pkgbuild = "arch=(any)\n";
        assert_eq!(declared_archs(pkgbuild), vec![Arch::any()]);
    }

    #[test]
    fn missing_arch_array_yields_empty() {
        assert_eq!(declared_archs("pkgname=foo\n"), Vec::<Arch>::new());
    }
}
