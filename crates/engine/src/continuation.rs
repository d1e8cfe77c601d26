//! Continuation resolver: holds a job back until its parent succeeds.
//!
//! The waiting unit polls the parent with exponential back-off and a hard
//! ceiling. Completion of any job also wakes it early, so children of fast
//! parents are released without waiting a full interval. The resolver is the
//! only thing that releases an awaiting job.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use jobforge_core::{JobId, JobState};

use crate::engine::EngineInner;
use crate::store::{JobStore, Transition};
use crate::supervisor::{DispatchPath, execute, supervise};

#[derive(Debug, PartialEq, Eq)]
enum ParentOutcome {
    Pending,
    Succeeded,
    Failed(String),
}

fn parent_outcome<S: JobStore>(store: &S, parent_id: JobId) -> ParentOutcome {
    match store.get(parent_id) {
        Ok(Some(parent)) => match parent.state {
            JobState::Succeeded => ParentOutcome::Succeeded,
            JobState::Failed => ParentOutcome::Failed(format!(
                "parent job {parent_id} failed: {}",
                parent.failure_reason.as_deref().unwrap_or("unknown error")
            )),
            JobState::Deleted => ParentOutcome::Failed(format!("parent job {parent_id} was deleted")),
            JobState::Enqueued
            | JobState::Scheduled
            | JobState::Processing
            | JobState::Awaiting => ParentOutcome::Pending,
        },
        Ok(None) => ParentOutcome::Failed(format!("parent job {parent_id} no longer exists")),
        Err(e) => ParentOutcome::Failed(format!("parent job {parent_id} could not be read: {e}")),
    }
}

/// Wait for `parent_id`, then dispatch or fail `child_id`.
pub(crate) async fn wait_for_parent<S: JobStore + 'static>(
    inner: Arc<EngineInner<S>>,
    child_id: JobId,
    parent_id: JobId,
) {
    let policy = inner.config.continuation.clone();
    // `None` when the ceiling lies beyond what the clock can represent.
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut attempt: u32 = 0;

    debug!(job_id = %child_id, parent_id = %parent_id, "waiting for parent job");

    loop {
        // Registered before reading state so a completion in between is not lost.
        let woken = inner.completions.notified();

        match inner.store.get(child_id) {
            Ok(Some(child)) if child.state == JobState::Awaiting => {}
            Ok(_) => {
                debug!(job_id = %child_id, "continuation no longer awaiting; stop waiting");
                return;
            }
            Err(e) => {
                error!(job_id = %child_id, error = %e, "failed to read continuation");
                return;
            }
        }

        match parent_outcome(&inner.store, parent_id) {
            ParentOutcome::Succeeded => {
                release(&inner, child_id, parent_id);
                return;
            }
            ParentOutcome::Failed(reason) => {
                fail(&inner, child_id, reason);
                return;
            }
            ParentOutcome::Pending => {}
        }

        let remaining = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    let reason = format!(
                        "timed out after {:?} waiting for parent job {parent_id}",
                        policy.timeout
                    );
                    fail(&inner, child_id, reason);
                    return;
                }
                deadline - now
            }
            None => Duration::MAX,
        };

        let delay = policy.delay_for_attempt(attempt).min(remaining);
        attempt = attempt.saturating_add(1);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = woken => {}
        }
    }
}

fn release<S: JobStore + 'static>(inner: &Arc<EngineInner<S>>, child_id: JobId, parent_id: JobId) {
    match inner.store.transition(child_id, Transition::Release) {
        Ok(_) => {
            info!(job_id = %child_id, parent_id = %parent_id, "parent succeeded; continuation enqueued");
            supervise(
                inner,
                child_id,
                DispatchPath::Continuation,
                execute(Arc::clone(inner), child_id),
            );
        }
        Err(e) => debug!(job_id = %child_id, error = %e, "continuation not released"),
    }
}

fn fail<S: JobStore>(inner: &EngineInner<S>, child_id: JobId, reason: String) {
    match inner.store.transition(child_id, Transition::Fail(reason.clone())) {
        Ok(_) => {
            warn!(job_id = %child_id, reason = %reason, "continuation failed");
            inner.completions.notify_waiters();
        }
        Err(e) => debug!(job_id = %child_id, error = %e, "continuation not marked failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryJobStore;
    use crate::types::{Job, WorkType};
    use crate::work::WorkUnit;

    fn job() -> Job {
        Job::enqueued(WorkType::new("test"), WorkUnit::new(|_ctx| async { Ok(()) }))
    }

    #[test]
    fn pending_parent_keeps_waiting() {
        let store = InMemoryJobStore::new();
        let parent = store.insert(job()).unwrap();
        assert_eq!(parent_outcome(&store, parent), ParentOutcome::Pending);

        store.transition(parent, Transition::Start).unwrap();
        assert_eq!(parent_outcome(&store, parent), ParentOutcome::Pending);
    }

    #[test]
    fn parent_outcomes_are_distinguishable() {
        let store = InMemoryJobStore::new();

        let ok = store.insert(job()).unwrap();
        store.transition(ok, Transition::Start).unwrap();
        store.transition(ok, Transition::Succeed).unwrap();
        assert_eq!(parent_outcome(&store, ok), ParentOutcome::Succeeded);

        let failed = store.insert(job()).unwrap();
        store.transition(failed, Transition::Start).unwrap();
        store.transition(failed, Transition::Fail("db down".into())).unwrap();
        let ParentOutcome::Failed(reason) = parent_outcome(&store, failed) else {
            panic!("expected failure");
        };
        assert!(reason.contains("failed: db down"));

        let deleted = store.insert(job()).unwrap();
        store.transition(deleted, Transition::Delete).unwrap();
        let ParentOutcome::Failed(reason) = parent_outcome(&store, deleted) else {
            panic!("expected failure");
        };
        assert!(reason.ends_with("was deleted"));

        let ParentOutcome::Failed(reason) = parent_outcome(&store, JobId::new()) else {
            panic!("expected failure");
        };
        assert!(reason.ends_with("no longer exists"));
    }
}
