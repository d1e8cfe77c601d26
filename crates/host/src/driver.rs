//! Recurring job driver.
//!
//! The engine stores schedule descriptors without reading them. This driver
//! reads them as [`Cadence`]s on a fixed tick and calls
//! [`JobEngine::trigger_recurring`] for every entry that is due.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use jobforge_engine::{InMemoryJobStore, JobEngine, JobId, JobStore, RecurringJob, RecurringJobId};

use crate::cadence::Cadence;

/// Whether `entry` is due at `now` under `cadence`.
///
/// An entry that never ran is measured from its creation.
pub fn is_due(entry: &RecurringJob, cadence: Cadence, now: DateTime<Utc>) -> bool {
    let anchor = entry.last_executed_at.unwrap_or(entry.created_at);
    cadence.next_after(anchor) <= now
}

pub struct RecurringDriver<S: JobStore = InMemoryJobStore> {
    engine: JobEngine<S>,
    period: Duration,
    /// `(id, descriptor)` pairs already reported as unreadable
    rejected: HashSet<(RecurringJobId, String)>,
}

impl<S: JobStore + 'static> RecurringDriver<S> {
    pub fn new(engine: JobEngine<S>, period: Duration) -> Self {
        Self {
            engine,
            period: period.max(Duration::from_millis(10)),
            rejected: HashSet::new(),
        }
    }

    /// Trigger every entry due at `now`; returns the spawned job ids.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<JobId> {
        let entries = match self.engine.list_recurring() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to list recurring jobs");
                return Vec::new();
            }
        };

        let mut spawned = Vec::new();
        for entry in entries {
            let cadence = match entry.schedule.parse::<Cadence>() {
                Ok(cadence) => cadence,
                Err(e) => {
                    if self.rejected.insert((entry.id.clone(), entry.schedule.clone())) {
                        warn!(
                            recurring_id = %entry.id,
                            schedule = %entry.schedule,
                            error = %e,
                            "recurring job has an unreadable schedule; only manual triggers will run it"
                        );
                    }
                    continue;
                }
            };

            if !is_due(&entry, cadence, now) {
                continue;
            }

            match self.engine.trigger_recurring(&entry.id) {
                Some(job_id) => spawned.push(job_id),
                None => debug!(recurring_id = %entry.id, "recurring job vanished before trigger"),
            }
        }
        spawned
    }

    /// Tick until `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(tick_ms = self.period.as_millis() as u64, "recurring driver started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let spawned = self.tick(Utc::now());
                    if !spawned.is_empty() {
                        debug!(count = spawned.len(), "recurring jobs triggered");
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        info!("recurring driver stopped");
    }
}
