//! Execution supervisor.
//!
//! Every execution unit is spawned through [`supervise`], which pairs it with
//! a second task awaiting its `JoinHandle`. The primary path inside
//! [`execute`] records success or failure of the unit of work; the hook only
//! fires when something escapes that path (a panic in the engine itself, or a
//! cancelled task) and still records the job as `Failed`.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use jobforge_core::{JobId, JobState};

use crate::engine::EngineInner;
use crate::store::{JobStore, JobStoreError, Transition};
use crate::types::Job;
use crate::work::JobContext;

/// How a unit reached the supervisor (for logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    Immediate,
    Delayed,
    Continuation,
    Recurring,
    Requeue,
}

impl DispatchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchPath::Immediate => "immediate",
            DispatchPath::Delayed => "delayed",
            DispatchPath::Continuation => "continuation",
            DispatchPath::Recurring => "recurring",
            DispatchPath::Requeue => "requeue",
        }
    }
}

/// Spawn `unit` for `job_id` with a supervisory completion hook attached.
pub(crate) fn supervise<S, F>(inner: &Arc<EngineInner<S>>, job_id: JobId, path: DispatchPath, unit: F)
where
    S: JobStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let span = info_span!("job", job.id = %job_id, path = path.as_str());
    let handle = inner.runtime.spawn(unit.instrument(span));

    let hook = Arc::clone(inner);
    inner.runtime.spawn(async move {
        let Err(join_error) = handle.await else {
            return;
        };

        let reason = if join_error.is_panic() {
            format!("execution unit panicked: {}", panic_message(&*join_error.into_panic()))
        } else {
            "execution unit was cancelled".to_string()
        };

        error!(job_id = %job_id, path = path.as_str(), reason = %reason, "unobserved fault in execution unit");

        match hook.store.transition(job_id, Transition::Fail(reason)) {
            Ok(_) => hook.completions.notify_waiters(),
            Err(e) => debug!(job_id = %job_id, error = %e, "faulted job not marked failed"),
        }
    });
}

/// Run one attempt of `job_id`: start it, invoke the unit, record the outcome.
pub(crate) async fn execute<S: JobStore + 'static>(inner: Arc<EngineInner<S>>, job_id: JobId) {
    let _permit = match &inner.permits {
        Some(permits) => match Arc::clone(permits).acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!(job_id = %job_id, "concurrency limiter closed; job not started");
                return;
            }
        },
        None => None,
    };

    let job = match inner.store.transition(job_id, Transition::Start) {
        Ok(job) => job,
        Err(JobStoreError::NotFound(_)) => {
            debug!(job_id = %job_id, "job no longer tracked; skipping");
            return;
        }
        Err(JobStoreError::State(e)) => {
            let deleted = matches!(
                inner.store.get(job_id),
                Ok(Some(Job { state: JobState::Deleted, .. }))
            );
            if deleted {
                info!(job_id = %job_id, "job deleted before dispatch; skipping");
            } else {
                warn!(job_id = %job_id, error = %e, "job not startable; skipping");
            }
            return;
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "failed to start job");
            return;
        }
    };

    info!(
        job_id = %job.id,
        work_type = %job.work_type,
        retry_count = job.retry_count,
        "job started"
    );

    let started = Instant::now();
    let outcome = run_unit(&inner, &job).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let transition = match &outcome {
        Ok(()) => Transition::Succeed,
        Err(reason) => Transition::Fail(reason.clone()),
    };

    match (inner.store.transition(job_id, transition), outcome) {
        (Ok(_), Ok(())) => {
            info!(job_id = %job_id, work_type = %job.work_type, elapsed_ms, "job succeeded");
        }
        (Ok(_), Err(reason)) => {
            warn!(job_id = %job_id, work_type = %job.work_type, elapsed_ms, reason = %reason, "job failed");
        }
        (Err(e), _) => {
            info!(job_id = %job_id, error = %e, elapsed_ms, "job outcome discarded");
        }
    }

    inner.completions.notify_waiters();
}

async fn run_unit<S: JobStore + 'static>(inner: &EngineInner<S>, job: &Job) -> Result<(), String> {
    let scope = inner.resolver.resolve(&job.work_type).map_err(|e| {
        warn!(job_id = %job.id, work_type = %job.work_type, error = %format!("{e:#}"), "handler resolution failed");
        failure_reason(&e)
    })?;

    let ctx = JobContext::new(job.id, job.work_type.clone(), job.retry_count, scope);
    let work = job.work.clone();

    match AssertUnwindSafe(async move { work.invoke(ctx).await })
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(job_id = %job.id, error = %format!("{e:#}"), "unit of work returned an error");
            Err(failure_reason(&e))
        }
        Err(panic) => Err(format!("panicked: {}", panic_message(&*panic))),
    }
}

/// Innermost cause of an error chain, so wrapper context does not hide it.
pub fn failure_reason(error: &anyhow::Error) -> String {
    let root = error.root_cause().to_string();
    if !root.trim().is_empty() {
        return root;
    }
    let outer = error.to_string();
    if outer.trim().is_empty() {
        "unknown error".to_string()
    } else {
        outer
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn failure_reason_unwraps_to_the_root_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "lab result file missing");
        let err = Err::<(), _>(io)
            .context("loading lab results")
            .context("invoking labs.import handler")
            .unwrap_err();

        assert_eq!(failure_reason(&err), "lab result file missing");
    }

    #[test]
    fn failure_reason_falls_back_when_cause_is_blank() {
        let err = anyhow::anyhow!("");
        assert_eq!(failure_reason(&err), "unknown error");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*boxed), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(&*boxed), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*boxed), "non-string panic payload");
    }
}
