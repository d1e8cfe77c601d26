//! Job state machine.
//!
//! ```text
//! Enqueued* ──► Processing ──► Succeeded
//! Scheduled* ─┘      │
//!                    └──────► Failed ──(requeue)──► Enqueued
//! Awaiting* ──► Enqueued
//!     └───────► Failed
//! any non-deleted state ──► Deleted
//! ```
//!
//! `Enqueued`/`Scheduled` may also go straight to `Failed` when the supervisor
//! observes a fault before the unit of work started.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Lifecycle state of a job record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Ready to run; handed to the supervisor.
    Enqueued,
    /// Waiting for a delay or an absolute time.
    Scheduled,
    /// Currently executing.
    Processing,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error; may be requeued.
    Failed,
    /// Soft-deleted; reclaimed by the retention sweep.
    Deleted,
    /// Waiting on a parent job to succeed.
    Awaiting,
}

impl JobState {
    pub const ALL: [JobState; 7] = [
        JobState::Enqueued,
        JobState::Scheduled,
        JobState::Processing,
        JobState::Succeeded,
        JobState::Failed,
        JobState::Deleted,
        JobState::Awaiting,
    ];

    /// States a record may be created in.
    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            JobState::Enqueued | JobState::Scheduled | JobState::Awaiting
        )
    }

    /// States with no further execution (only reclamation or requeue).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Deleted
        )
    }

    /// Whether `self -> to` is an edge of the state machine.
    pub fn can_transition_to(&self, to: JobState) -> bool {
        use JobState::*;

        match (self, to) {
            (Deleted, _) => false,
            (_, Deleted) => true,
            (Enqueued, Processing) | (Scheduled, Processing) => true,
            (Enqueued, Failed) | (Scheduled, Failed) => true,
            (Awaiting, Enqueued) | (Awaiting, Failed) => true,
            (Processing, Succeeded) | (Processing, Failed) => true,
            (Failed, Enqueued) => true,
            _ => false,
        }
    }

    /// Validate `self -> to`, returning the target state.
    pub fn transition(self, to: JobState) -> CoreResult<JobState> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(CoreError::invalid_transition(self, to))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Enqueued => "enqueued",
            JobState::Scheduled => "scheduled",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Deleted => "deleted",
            JobState::Awaiting => "awaiting",
        }
    }
}

impl core::fmt::Display for JobState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
