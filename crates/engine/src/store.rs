//! Job registry implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use jobforge_core::{CoreError, JobId, JobState};

use crate::types::{Job, JobStats};

/// A state change applied atomically to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `Enqueued | Scheduled -> Processing`
    Start,
    /// `Processing -> Succeeded`
    Succeed,
    /// `* -> Failed` with a reason
    Fail(String),
    /// `Awaiting -> Enqueued`
    Release,
    /// `* -> Deleted`
    Delete,
    /// `Failed -> Enqueued`, bumps `retry_count`
    Requeue,
}

impl Transition {
    fn apply(&self, job: &mut Job) -> Result<(), CoreError> {
        match self {
            Transition::Start => job.mark_processing(),
            Transition::Succeed => job.mark_succeeded(),
            Transition::Fail(reason) => job.mark_failed(reason.clone()),
            Transition::Release => job.mark_released(),
            Transition::Delete => job.mark_deleted(),
            Transition::Requeue => job.requeue(),
        }
    }
}

/// Job registry abstraction.
///
/// The single source of truth for job state. Every method must be safe to call
/// concurrently from execution units and the retention sweep.
pub trait JobStore: Send + Sync {
    /// Track a new job.
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Get a snapshot of a job.
    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Apply a transition atomically; returns the updated snapshot.
    fn transition(&self, job_id: JobId, transition: Transition) -> Result<Job, JobStoreError>;

    /// Stop tracking a job.
    fn remove(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// List jobs, optionally filtered by state, oldest first.
    fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, JobStoreError>;

    /// Remove every job matching `predicate`; returns the removed records.
    fn remove_where(&self, predicate: &dyn Fn(&Job) -> bool) -> Result<Vec<Job>, JobStoreError>;

    /// Get job statistics.
    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error(transparent)]
    State(#[from] CoreError),
    #[error("job registry lock poisoned")]
    Poisoned,
}

/// In-memory job registry.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.read().map_err(|_| JobStoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.write().map_err(|_| JobStoreError::Poisoned)
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.write()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.read()?.get(&job_id).cloned())
    }

    fn transition(&self, job_id: JobId, transition: Transition) -> Result<Job, JobStoreError> {
        let mut jobs = self.write()?;
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        transition.apply(job)?;
        Ok(job.clone())
    }

    fn remove(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.write()?.remove(&job_id))
    }

    fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.read()?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| state.is_none_or(|s| j.state == s))
            .cloned()
            .collect();

        result.sort_by_key(|j| (j.created_at, j.id));
        Ok(result)
    }

    fn remove_where(&self, predicate: &dyn Fn(&Job) -> bool) -> Result<Vec<Job>, JobStoreError> {
        let mut jobs = self.write()?;
        let doomed: Vec<JobId> = jobs
            .values()
            .filter(|j| predicate(j))
            .map(|j| j.id)
            .collect();

        Ok(doomed.iter().filter_map(|id| jobs.remove(id)).collect())
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.read()?;
        let mut stats = JobStats::default();
        for job in jobs.values() {
            stats.record(job);
        }
        Ok(stats)
    }
}

impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).insert(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn transition(&self, job_id: JobId, transition: Transition) -> Result<Job, JobStoreError> {
        (**self).transition(job_id, transition)
    }

    fn remove(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).remove(job_id)
    }

    fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, JobStoreError> {
        (**self).list(state)
    }

    fn remove_where(&self, predicate: &dyn Fn(&Job) -> bool) -> Result<Vec<Job>, JobStoreError> {
        (**self).remove_where(predicate)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}
