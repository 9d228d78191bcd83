// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-memory job queue. Kept plain and directly testable; the daemon
//! owns it exclusively inside the single build loop, so no
//! synchronization wrapper is needed.

use packhouse_core::{Arch, Dirname, Job};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("finish({dirname}, {arch}) does not match the current job ({current_dirname}, {current_arch})")]
    Mismatch {
        dirname: Dirname,
        arch: Arch,
        current_dirname: Dirname,
        current_arch: Arch,
    },
    #[error("finish called with no current job held")]
    NoCurrentJob,
}

#[derive(Debug, Default)]
pub struct JobQueue {
    queued: Vec<Job>,
    current: Option<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove any existing Job with the same `(dirname, arch)`, append
    /// the new one, and log the displacement.
    pub fn enqueue(&mut self, job: Job) {
        let key = job.key();
        if let Some(pos) = self.queued.iter().position(|j| j.key() == key) {
            let displaced = self.queued.remove(pos);
            tracing::info!(
                dirname = %displaced.dirname,
                arch = %displaced.arch,
                displaced_version = %displaced.version,
                new_version = %job.version,
                "job displaced by newer enqueue"
            );
        }
        self.queued.push(job);
    }

    /// Pop the next job to run. If a current job is already held (leaked
    /// from a prior failure), force-finish it first and recurse.
    pub fn take(&mut self) -> Option<Job> {
        if self.current.is_some() {
            tracing::warn!("force-finishing leaked current job before taking the next one");
            self.current = None;
        }
        self.queued.sort_by(|a, b| b.priority.cmp(&a.priority));
        if self.queued.is_empty() {
            return None;
        }
        let job = self.queued.remove(0);
        self.current = Some(job.clone());
        self.current.clone()
    }

    /// Complete the current job. Unless `force`, asserts the completing
    /// job matches the held current job.
    pub fn finish(&mut self, dirname: &Dirname, arch: &Arch, force: bool) -> Result<(), QueueError> {
        match &self.current {
            None => {
                if force {
                    Ok(())
                } else {
                    Err(QueueError::NoCurrentJob)
                }
            }
            Some(current) => {
                if !force && (&current.dirname != dirname || &current.arch != arch) {
                    return Err(QueueError::Mismatch {
                        dirname: dirname.clone(),
                        arch: arch.clone(),
                        current_dirname: current.dirname.clone(),
                        current_arch: current.arch.clone(),
                    });
                }
                self.current = None;
                Ok(())
            }
        }
    }

    pub fn current(&self) -> Option<&Job> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty() && self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packhouse_core::Version;

    fn job(dirname: &str, arch: &str, version: &str) -> Job {
        Job::new(
            Dirname::new(dirname),
            Arch::new(arch),
            Version::new(version),
            vec![],
            0,
        )
    }

    #[test]
    fn enqueue_displaces_same_dirname_arch() {
        let mut q = JobQueue::new();
        q.enqueue(job("foo", "x86_64", "1.0-1"));
        q.enqueue(job("foo", "x86_64", "1.1-1"));
        assert_eq!(q.len(), 1);
        let taken = q.take().unwrap();
        assert_eq!(taken.version, Version::new("1.1-1"));
    }

    #[test]
    fn take_force_finishes_leaked_current_job() {
        let mut q = JobQueue::new();
        q.enqueue(job("foo", "x86_64", "1.0-1"));
        q.take();
        q.enqueue(job("bar", "x86_64", "1.0-1"));
        let taken = q.take().unwrap();
        assert_eq!(taken.dirname, Dirname::new("bar"));
    }

    #[test]
    fn finish_rejects_mismatched_key_without_force() {
        let mut q = JobQueue::new();
        q.enqueue(job("foo", "x86_64", "1.0-1"));
        q.take();
        let err = q.finish(&Dirname::new("other"), &Arch::new("x86_64"), false);
        assert!(matches!(err, Err(QueueError::Mismatch { .. })));
    }

    #[test]
    fn empty_queue_yields_none() {
        let mut q = JobQueue::new();
        assert!(q.take().is_none());
    }
}
