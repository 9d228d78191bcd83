// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version ledger persistence, served-repository filesystem layout, and
//! the daemon state-directory lock.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod ledger_store;
pub mod layout;
pub mod lockfile;

pub use layout::{filter_old, quarantine, LayoutError, RepoLayout};
pub use ledger_store::{LedgerStore, LedgerStoreError};
pub use lockfile::{LockError, StateLock};
