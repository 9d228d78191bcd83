// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CPU architecture identifiers and the build-arch mapping table: the
//! served tree spans an architecture-neutral set (which always includes
//! the synthetic `any` arch) while only a subset of those are
//! architectures a builder can actually compile on.

use std::collections::BTreeMap;

crate::define_id! {
    /// A served architecture, e.g. `x86_64`, `aarch64`, or the
    /// architecture-neutral `any`.
    pub struct Arch;
}

impl Arch {
    /// The synthetic arch-neutral identifier.
    pub fn any() -> Self {
        Arch::new("any")
    }

    pub fn is_any(&self) -> bool {
        self.0 == "any"
    }
}

/// Maps every served arch to the build-capable arch that should compile it,
/// or `None` if no builder exists for it (e.g. `armv7h` with no dedicated
/// build host).
#[derive(Debug, Clone)]
pub struct ArchMapping {
    table: BTreeMap<Arch, Option<Arch>>,
    /// Preferred representative arch for recipes that declare more than
    /// one buildable arch.
    preferred: Arch,
}

impl ArchMapping {
    pub fn new(table: BTreeMap<Arch, Option<Arch>>, preferred: Arch) -> Self {
        Self { table, preferred }
    }

    /// Map a served arch through the table, dropping unmapped entries.
    pub fn map_arch(&self, arch: &Arch) -> Option<Arch> {
        self.table.get(arch).cloned().flatten()
    }

    /// Map a list of declared archs, in order, dropping any that have no
    /// build-capable mapping.
    pub fn map_all(&self, archs: &[Arch]) -> Vec<Arch> {
        archs.iter().filter_map(|a| self.map_arch(a)).collect()
    }

    /// Choose the representative build arch for a set of mapped archs:
    /// the preferred arch if present, else the first one.
    pub fn representative<'a>(&self, mapped: &'a [Arch]) -> Option<&'a Arch> {
        mapped
            .iter()
            .find(|a| **a == self.preferred)
            .or_else(|| mapped.first())
    }

    pub fn build_archs(&self) -> Vec<Arch> {
        self.table
            .values()
            .filter_map(|v| v.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> ArchMapping {
        let mut table = BTreeMap::new();
        table.insert(Arch::new("aarch64"), Some(Arch::new("aarch64")));
        table.insert(Arch::new("x86_64"), Some(Arch::new("x86_64")));
        table.insert(Arch::any(), Some(Arch::new("x86_64")));
        table.insert(Arch::new("armv7h"), None);
        ArchMapping::new(table, Arch::new("x86_64"))
    }

    #[test]
    fn drops_unmapped_archs() {
        let m = mapping();
        let mapped = m.map_all(&[Arch::new("armv7h"), Arch::new("aarch64")]);
        assert_eq!(mapped, vec![Arch::new("aarch64")]);
    }

    #[test]
    fn prefers_x86_64_representative() {
        let m = mapping();
        let mapped = vec![Arch::new("aarch64"), Arch::new("x86_64")];
        assert_eq!(m.representative(&mapped), Some(&Arch::new("x86_64")));
    }

    #[test]
    fn falls_back_to_first_when_preferred_absent() {
        let m = mapping();
        let mapped = vec![Arch::new("aarch64")];
        assert_eq!(m.representative(&mapped), Some(&Arch::new("aarch64")));
    }

    #[test]
    fn any_arch_recognized() {
        assert!(Arch::any().is_any());
        assert!(!Arch::new("x86_64").is_any());
    }
}
