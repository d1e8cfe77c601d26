//! Retention sweep: bounds the registry's memory footprint.

use std::sync::RwLock;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use jobforge_core::JobState;

use crate::config::RetentionPolicy;
use crate::store::{JobStore, JobStoreError};
use crate::types::Job;

/// What a sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub succeeded: usize,
    pub failed: usize,
    pub deleted: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.deleted
    }
}

/// Whether a record is due for reclamation at `now`.
///
/// Only `Succeeded`, `Failed` and `Deleted` records are ever eligible.
pub fn is_expired(job: &Job, policy: &RetentionPolicy, now: DateTime<Utc>) -> bool {
    match job.state {
        JobState::Deleted => true,
        JobState::Succeeded => finished_before(job, policy.succeeded, now),
        JobState::Failed => finished_before(job, policy.failed, now),
        JobState::Enqueued | JobState::Scheduled | JobState::Processing | JobState::Awaiting => {
            false
        }
    }
}

fn finished_before(job: &Job, window: std::time::Duration, now: DateTime<Utc>) -> bool {
    let finished = job.completed_at.unwrap_or(job.updated_at);
    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(finished) > window
}

/// Remove every expired record from `store`.
pub fn sweep<S: JobStore + ?Sized>(
    store: &S,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<SweepReport, JobStoreError> {
    let removed = store.remove_where(&|job: &Job| is_expired(job, policy, now))?;

    let mut report = SweepReport::default();
    for job in &removed {
        match job.state {
            JobState::Succeeded => report.succeeded += 1,
            JobState::Failed => report.failed += 1,
            _ => report.deleted += 1,
        }
    }
    Ok(report)
}

/// Cadence gate shared by every caller that may trigger a sweep.
#[derive(Debug)]
pub(crate) struct SweepGate {
    last_swept_at: RwLock<DateTime<Utc>>,
}

impl SweepGate {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_swept_at: RwLock::new(now),
        }
    }

    /// Claim the next sweep if `interval` elapsed since the last one.
    ///
    /// Checked once under the read lock and again under the write lock, so
    /// concurrent callers elect a single sweeper.
    pub(crate) fn try_claim(
        &self,
        now: DateTime<Utc>,
        interval: std::time::Duration,
    ) -> Result<bool, JobStoreError> {
        let interval = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);

        {
            let last = self
                .last_swept_at
                .read()
                .map_err(|_| JobStoreError::Poisoned)?;
            if now.signed_duration_since(*last) < interval {
                return Ok(false);
            }
        }

        let mut last = self
            .last_swept_at
            .write()
            .map_err(|_| JobStoreError::Poisoned)?;
        if now.signed_duration_since(*last) < interval {
            return Ok(false);
        }
        *last = now;
        Ok(true)
    }

    /// Record an unconditional sweep.
    pub(crate) fn mark(&self, now: DateTime<Utc>) -> Result<(), JobStoreError> {
        let mut last = self
            .last_swept_at
            .write()
            .map_err(|_| JobStoreError::Poisoned)?;
        *last = now.max(*last);
        Ok(())
    }
}
