// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The repo daemon's engine: the upload reservation slot and the
//! integrator that reconciles the served tree against what lands in
//! `updates/`.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod integrator;
pub mod reservation;

pub use integrator::{Integrator, IntegratorError};
pub use reservation::{
    per_file_timeout_secs, PushStartOutcome, Reservation, ReservationError, ReservationManager,
};
