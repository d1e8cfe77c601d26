//! Job and recurring-job records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use jobforge_core::{CoreResult, JobId, JobState, RecurringJobId};

use crate::work::WorkUnit;

/// Label identifying what kind of handler a unit of work needs.
///
/// Opaque to the engine apart from handler resolution and logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WorkType(String);

impl WorkType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for WorkType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A tracked job.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Current state
    pub state: JobState,
    /// Handler label
    pub work_type: WorkType,
    #[serde(skip)]
    pub(crate) work: WorkUnit,
    /// When the job was submitted
    pub created_at: DateTime<Utc>,
    /// When the record last changed
    pub updated_at: DateTime<Utc>,
    /// When a `Scheduled` job becomes due
    pub scheduled_for: Option<DateTime<Utc>>,
    /// When the current attempt started
    pub started_at: Option<DateTime<Utc>>,
    /// When the current attempt finished
    pub completed_at: Option<DateTime<Utc>>,
    /// Innermost cause of the last failure
    pub failure_reason: Option<String>,
    /// Number of explicit requeues
    pub retry_count: u32,
    /// Job this one waits on
    pub parent_id: Option<JobId>,
    /// Finished attempts, oldest first
    pub history: Vec<JobAttempt>,
}

/// Record of a finished execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobAttempt {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl Job {
    fn with_state(work_type: WorkType, work: WorkUnit, state: JobState) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            state,
            work_type,
            work,
            created_at: now,
            updated_at: now,
            scheduled_for: None,
            started_at: None,
            completed_at: None,
            failure_reason: None,
            retry_count: 0,
            parent_id: None,
            history: Vec::new(),
        }
    }

    /// A job ready to run now.
    pub fn enqueued(work_type: WorkType, work: WorkUnit) -> Self {
        Self::with_state(work_type, work, JobState::Enqueued)
    }

    /// A job due at `at`.
    pub fn scheduled(work_type: WorkType, work: WorkUnit, at: DateTime<Utc>) -> Self {
        let mut job = Self::with_state(work_type, work, JobState::Scheduled);
        job.scheduled_for = Some(at);
        job
    }

    /// A job that waits for `parent_id` to succeed.
    pub fn awaiting(parent_id: JobId, work_type: WorkType, work: WorkUnit) -> Self {
        let mut job = Self::with_state(work_type, work, JobState::Awaiting);
        job.parent_id = Some(parent_id);
        job
    }

    fn move_to(&mut self, to: JobState) -> CoreResult<DateTime<Utc>> {
        self.state = self.state.transition(to)?;
        let now = Utc::now().max(self.updated_at);
        self.updated_at = now;
        Ok(now)
    }

    /// Mark the job as running and stamp `started_at`.
    pub fn mark_processing(&mut self) -> CoreResult<()> {
        let now = self.move_to(JobState::Processing)?;
        self.started_at = Some(now.max(self.created_at));
        Ok(())
    }

    /// Mark the job as succeeded.
    pub fn mark_succeeded(&mut self) -> CoreResult<()> {
        let now = self.move_to(JobState::Succeeded)?;
        self.finish(now, None);
        Ok(())
    }

    /// Mark the job as failed with `reason`.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> CoreResult<()> {
        let now = self.move_to(JobState::Failed)?;
        self.finish(now, Some(reason.into()));
        Ok(())
    }

    /// Release an awaiting job once its parent succeeded.
    pub fn mark_released(&mut self) -> CoreResult<()> {
        self.move_to(JobState::Enqueued)?;
        Ok(())
    }

    /// Soft delete. Does not touch timing fields.
    pub fn mark_deleted(&mut self) -> CoreResult<()> {
        self.move_to(JobState::Deleted)?;
        Ok(())
    }

    /// Move a failed job back to `Enqueued` for another attempt.
    pub fn requeue(&mut self) -> CoreResult<()> {
        self.move_to(JobState::Enqueued)?;
        self.retry_count += 1;
        self.started_at = None;
        self.completed_at = None;
        self.failure_reason = None;
        Ok(())
    }

    fn finish(&mut self, now: DateTime<Utc>, error: Option<String>) {
        let completed_at = self.started_at.map_or(now, |started| now.max(started));
        self.completed_at = Some(completed_at);

        if let Some(started_at) = self.started_at {
            self.history.push(JobAttempt {
                attempt: self.retry_count + 1,
                started_at,
                finished_at: completed_at,
                succeeded: error.is_none(),
                error: error.clone(),
                duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
            });
        }

        self.failure_reason = error;
    }
}

/// Aggregate view of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub enqueued: usize,
    pub scheduled: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deleted: usize,
    pub awaiting: usize,
    pub total: usize,
    pub recurring: usize,
    /// `created_at` of the oldest tracked job
    pub oldest_created_at: Option<DateTime<Utc>>,
    /// Most recent `completed_at` across tracked jobs
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl JobStats {
    pub(crate) fn record(&mut self, job: &Job) {
        match job.state {
            JobState::Enqueued => self.enqueued += 1,
            JobState::Scheduled => self.scheduled += 1,
            JobState::Processing => self.processing += 1,
            JobState::Succeeded => self.succeeded += 1,
            JobState::Failed => self.failed += 1,
            JobState::Deleted => self.deleted += 1,
            JobState::Awaiting => self.awaiting += 1,
        }
        self.total += 1;

        self.oldest_created_at = Some(
            self.oldest_created_at
                .map_or(job.created_at, |oldest| oldest.min(job.created_at)),
        );
        if let Some(done) = job.completed_at {
            self.last_completed_at = Some(self.last_completed_at.map_or(done, |last| last.max(done)));
        }
    }

    pub fn count(&self, state: JobState) -> usize {
        match state {
            JobState::Enqueued => self.enqueued,
            JobState::Scheduled => self.scheduled,
            JobState::Processing => self.processing,
            JobState::Succeeded => self.succeeded,
            JobState::Failed => self.failed,
            JobState::Deleted => self.deleted,
            JobState::Awaiting => self.awaiting,
        }
    }
}

/// A durable schedule entry; each trigger spawns a new [`Job`].
#[derive(Debug, Clone, Serialize)]
pub struct RecurringJob {
    pub id: RecurringJobId,
    /// Interpreted by the host driver, never by the engine
    pub schedule: String,
    pub work_type: WorkType,
    #[serde(skip)]
    pub(crate) work: WorkUnit,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub last_job_id: Option<JobId>,
}
