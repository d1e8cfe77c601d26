//! Recurring job ledger.
//!
//! Holds durable schedule entries. The ledger never interprets the schedule
//! descriptor; a host driver decides when an entry is due and triggers it
//! through the engine.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use jobforge_core::{JobId, RecurringJobId};

use crate::store::JobStoreError;
use crate::types::{RecurringJob, WorkType};
use crate::work::WorkUnit;

#[derive(Debug, Default)]
pub struct RecurringLedger {
    entries: RwLock<HashMap<RecurringJobId, RecurringJob>>,
}

impl RecurringLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<RecurringJobId, RecurringJob>>, JobStoreError> {
        self.entries.read().map_err(|_| JobStoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<RecurringJobId, RecurringJob>>, JobStoreError> {
        self.entries.write().map_err(|_| JobStoreError::Poisoned)
    }

    /// Insert or replace an entry. `created_at` and trigger bookkeeping survive
    /// an update.
    pub fn add_or_update(
        &self,
        id: RecurringJobId,
        work_type: WorkType,
        work: WorkUnit,
        schedule: impl Into<String>,
    ) -> Result<RecurringJob, JobStoreError> {
        let now = Utc::now();
        let schedule = schedule.into();
        let mut entries = self.write()?;

        let entry = entries
            .entry(id.clone())
            .and_modify(|existing| {
                existing.schedule = schedule.clone();
                existing.work_type = work_type.clone();
                existing.work = work.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| RecurringJob {
                id,
                schedule,
                work_type,
                work,
                created_at: now,
                updated_at: now,
                last_executed_at: None,
                last_job_id: None,
            });

        Ok(entry.clone())
    }

    pub fn remove(&self, id: &RecurringJobId) -> Result<Option<RecurringJob>, JobStoreError> {
        Ok(self.write()?.remove(id))
    }

    pub fn get(&self, id: &RecurringJobId) -> Result<Option<RecurringJob>, JobStoreError> {
        Ok(self.read()?.get(id).cloned())
    }

    /// All entries, sorted by id.
    pub fn list(&self) -> Result<Vec<RecurringJob>, JobStoreError> {
        let mut entries: Vec<_> = self.read()?.values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    pub fn len(&self) -> Result<usize, JobStoreError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, JobStoreError> {
        Ok(self.len()? == 0)
    }

    /// Note that `id` spawned `job_id` at `at`. Returns false if the entry was
    /// removed in the meantime.
    pub(crate) fn record_trigger(
        &self,
        id: &RecurringJobId,
        job_id: JobId,
        at: DateTime<Utc>,
    ) -> Result<bool, JobStoreError> {
        let mut entries = self.write()?;
        match entries.get_mut(id) {
            Some(entry) => {
                entry.last_executed_at = Some(at);
                entry.last_job_id = Some(job_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(name: &str) -> RecurringJobId {
        RecurringJobId::new(name).unwrap()
    }

    fn noop() -> WorkUnit {
        WorkUnit::new(|_ctx| async { Ok(()) })
    }

    #[test]
    fn update_keeps_creation_and_trigger_history() {
        let ledger = RecurringLedger::new();
        let first = ledger
            .add_or_update(rid("reminders"), WorkType::new("sms"), noop(), "@every 1h")
            .unwrap();

        let job_id = JobId::new();
        assert!(ledger.record_trigger(&rid("reminders"), job_id, Utc::now()).unwrap());

        let updated = ledger
            .add_or_update(rid("reminders"), WorkType::new("email"), noop(), "@every 5m")
            .unwrap();

        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(updated.schedule, "@every 5m");
        assert_eq!(updated.work_type, WorkType::new("email"));
        assert_eq!(updated.last_job_id, Some(job_id));
        assert!(updated.last_executed_at.is_some());
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn list_is_sorted_by_id() {
        let ledger = RecurringLedger::new();
        for name in ["zeta", "alpha", "mid"] {
            ledger
                .add_or_update(rid(name), WorkType::new("t"), noop(), "manual")
                .unwrap();
        }

        let ids: Vec<_> = ledger
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn trigger_on_removed_entry_is_ignored() {
        let ledger = RecurringLedger::new();
        ledger
            .add_or_update(rid("gone"), WorkType::new("t"), noop(), "manual")
            .unwrap();

        assert!(ledger.remove(&rid("gone")).unwrap().is_some());
        assert!(ledger.remove(&rid("gone")).unwrap().is_none());
        assert!(!ledger.record_trigger(&rid("gone"), JobId::new(), Utc::now()).unwrap());
        assert!(ledger.is_empty().unwrap());
    }
}
