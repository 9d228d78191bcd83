// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The repo daemon's single upload reservation slot: per-file timeout
//! calculation, the at-most-one-reservation invariant, and the watchdog
//! that expires a stale reservation.

use packhouse_core::Clock;
use thiserror::Error;

const MIN_TIMEOUT_SECS: f64 = 120.0;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("no reservation is currently held")]
    NoReservation,
    #[error("filenames passed to push_done do not match the held reservation")]
    FilenameMismatch,
}

/// `max(120, 2 * size_MB / (bandwidth_Mbps / 8))` seconds.
pub fn per_file_timeout_secs(size_mb: f64, bandwidth_mbps: f64) -> f64 {
    (2.0 * size_mb / (bandwidth_mbps / 8.0)).max(MIN_TIMEOUT_SECS)
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub filenames: Vec<String>,
    pub total_size_mb: f64,
    pub started_at: u64,
    pub deadline: u64,
}

/// Outcome of a `push_start` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PushStartOutcome {
    /// A reservation was created; one timeout per requested file, in the
    /// same order as the request.
    Created(Vec<f64>),
    /// A reservation is already held; carries the seconds remaining
    /// until it is released, for an informative busy marker.
    Busy(u64),
}

#[derive(Debug, Default)]
pub struct ReservationManager {
    current: Option<Reservation>,
}

impl ReservationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Reservation> {
        self.current.as_ref()
    }

    /// Force-release an expired reservation. Evaluated at the start of
    /// every `push_start`/`push_done`.
    pub fn tick(&mut self, clock: &dyn Clock) {
        if let Some(res) = &self.current {
            if clock.now_secs() > res.deadline {
                tracing::warn!(deadline = res.deadline, "reservation watchdog released an expired reservation");
                self.current = None;
            }
        }
    }

    pub fn push_start(
        &mut self,
        filenames: Vec<String>,
        sizes_mb: Vec<f64>,
        bandwidth_mbps: f64,
        clock: &dyn Clock,
    ) -> PushStartOutcome {
        self.tick(clock);
        if let Some(res) = &self.current {
            let now = clock.now_secs();
            return PushStartOutcome::Busy(res.deadline.saturating_sub(now));
        }

        let timeouts: Vec<f64> = sizes_mb
            .iter()
            .map(|mb| per_file_timeout_secs(*mb, bandwidth_mbps))
            .collect();
        let total_size_mb: f64 = sizes_mb.iter().sum();
        let overall_timeout = per_file_timeout_secs(total_size_mb, bandwidth_mbps);
        let now = clock.now_secs();
        self.current = Some(Reservation {
            filenames,
            total_size_mb,
            started_at: now,
            deadline: now + overall_timeout as u64,
        });
        PushStartOutcome::Created(timeouts)
    }

    pub fn push_add_time(&mut self, extra_secs: f64) -> Result<(), ReservationError> {
        let res = self.current.as_mut().ok_or(ReservationError::NoReservation)?;
        res.deadline += extra_secs as u64;
        Ok(())
    }

    /// Release the reservation, validating the completing filenames
    /// unless the caller is force-releasing (e.g. `push_fail`).
    pub fn release(&mut self, filenames: &[String]) -> Result<(), ReservationError> {
        let res = self.current.as_ref().ok_or(ReservationError::NoReservation)?;
        let matches = filenames.iter().all(|f| res.filenames.contains(f));
        if !matches {
            return Err(ReservationError::FilenameMismatch);
        }
        self.current = None;
        Ok(())
    }

    pub fn force_release(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packhouse_core::FakeClock;

    #[test]
    fn push_start_creates_reservation_and_rejects_a_second_one() {
        let mut mgr = ReservationManager::new();
        let clock = FakeClock::new(1000);
        let outcome = mgr.push_start(vec!["a.pkg".into()], vec![1.0], 100.0, &clock);
        assert!(matches!(outcome, PushStartOutcome::Created(_)));

        let second = mgr.push_start(vec!["b.pkg".into()], vec![1.0], 100.0, &clock);
        assert!(matches!(second, PushStartOutcome::Busy(_)));
    }

    #[test]
    fn reservation_expires_after_deadline() {
        let mut mgr = ReservationManager::new();
        let clock = FakeClock::new(1000);
        mgr.push_start(vec!["a.pkg".into()], vec![1.0], 100.0, &clock);
        clock.advance(200);
        mgr.tick(&clock);
        assert!(mgr.current().is_none());
    }

    #[test]
    fn per_file_timeout_floors_at_120() {
        assert_eq!(per_file_timeout_secs(1.0, 100.0), 120.0);
    }

    #[test]
    fn push_add_time_extends_deadline() {
        let mut mgr = ReservationManager::new();
        let clock = FakeClock::new(1000);
        mgr.push_start(vec!["a.pkg".into()], vec![1.0], 100.0, &clock);
        let before = mgr.current().unwrap().deadline;
        mgr.push_add_time(30.0).unwrap();
        assert_eq!(mgr.current().unwrap().deadline, before + 30);
    }

    #[test]
    fn release_rejects_unknown_filenames() {
        let mut mgr = ReservationManager::new();
        let clock = FakeClock::new(1000);
        mgr.push_start(vec!["a.pkg".into()], vec![1.0], 100.0, &clock);
        assert!(mgr.release(&["other.pkg".to_string()]).is_err());
        assert!(mgr.release(&["a.pkg".to_string()]).is_ok());
        assert!(mgr.current().is_none());
    }
}
