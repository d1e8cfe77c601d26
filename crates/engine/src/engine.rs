//! The engine facade: submission, control, queries and housekeeping.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use jobforge_core::{JobId, JobState, RecurringJobId};

use crate::config::EngineConfig;
use crate::continuation::wait_for_parent;
use crate::error::{EngineError, EngineResult};
use crate::recurring::RecurringLedger;
use crate::store::{InMemoryJobStore, JobStore, JobStoreError, Transition};
use crate::supervisor::{DispatchPath, execute, supervise};
use crate::sweep::{SweepGate, SweepReport};
use crate::types::{Job, JobStats, RecurringJob, WorkType};
use crate::work::{HandlerResolver, NoHandlers, WorkUnit};

/// State shared by the engine and every execution unit it spawns.
pub(crate) struct EngineInner<S> {
    pub(crate) config: EngineConfig,
    pub(crate) store: S,
    pub(crate) ledger: RecurringLedger,
    pub(crate) resolver: Arc<dyn HandlerResolver>,
    pub(crate) runtime: Handle,
    /// `None` when the concurrency ceiling is disabled
    pub(crate) permits: Option<Arc<Semaphore>>,
    /// Signalled whenever a job reaches a terminal state
    pub(crate) completions: Notify,
    pub(crate) sweep_gate: SweepGate,
}

/// In-process job engine.
///
/// All entry points are synchronous and return as soon as the job is recorded;
/// the work itself runs on the Tokio runtime the engine was built in. Clones
/// share the same registry.
pub struct JobEngine<S: JobStore = InMemoryJobStore> {
    inner: Arc<EngineInner<S>>,
}

impl<S: JobStore> Clone for JobEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: JobStore> std::fmt::Debug for JobEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEngine")
            .field("name", &self.inner.config.name)
            .field("max_concurrent_jobs", &self.inner.config.max_concurrent_jobs)
            .finish()
    }
}

/// Builder for [`JobEngine`].
pub struct EngineBuilder<S = InMemoryJobStore> {
    config: EngineConfig,
    store: S,
    resolver: Arc<dyn HandlerResolver>,
}

impl JobEngine<InMemoryJobStore> {
    /// Engine with an in-memory registry and no handler resolution.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder<InMemoryJobStore> {
        EngineBuilder {
            config,
            store: InMemoryJobStore::new(),
            resolver: Arc::new(NoHandlers),
        }
    }
}

impl<S: JobStore + 'static> EngineBuilder<S> {
    /// Use `store` as the job registry.
    pub fn store<T: JobStore + 'static>(self, store: T) -> EngineBuilder<T> {
        EngineBuilder {
            config: self.config,
            store,
            resolver: self.resolver,
        }
    }

    /// Use `resolver` to produce handler instances for units of work.
    pub fn resolver(mut self, resolver: impl HandlerResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Capture the current Tokio runtime and build the engine.
    pub fn build(self) -> EngineResult<JobEngine<S>> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let permits = match self.config.max_concurrent_jobs {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n.min(Semaphore::MAX_PERMITS)))),
        };

        info!(
            engine = %self.config.name,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "job engine started"
        );

        Ok(JobEngine {
            inner: Arc::new(EngineInner {
                store: self.store,
                ledger: RecurringLedger::new(),
                resolver: self.resolver,
                runtime,
                permits,
                completions: Notify::new(),
                sweep_gate: SweepGate::new(Utc::now()),
                config: self.config,
            }),
        })
    }
}

impl<S: JobStore + 'static> JobEngine<S> {
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The underlying registry.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    // ---------------------------------------------------------------------
    // Submission
    // ---------------------------------------------------------------------

    /// Record a job as `Enqueued` and dispatch it immediately.
    pub fn submit(&self, work_type: impl Into<WorkType>, work: WorkUnit) -> EngineResult<JobId> {
        self.dispatch(Job::enqueued(work_type.into(), work), DispatchPath::Immediate)
    }

    /// Record a job as `Scheduled` and dispatch it once `delay` elapsed.
    pub fn schedule(
        &self,
        work_type: impl Into<WorkType>,
        work: WorkUnit,
        delay: Duration,
    ) -> EngineResult<JobId> {
        if delay.is_zero() {
            return self.submit(work_type, work);
        }
        let when = TimeDelta::from_std(delay)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.schedule_after(work_type.into(), work, when, delay)
    }

    /// Record a job as `Scheduled` and dispatch it at `when`.
    ///
    /// A time that is not in the future behaves like [`submit`](Self::submit).
    pub fn schedule_at(
        &self,
        work_type: impl Into<WorkType>,
        work: WorkUnit,
        when: DateTime<Utc>,
    ) -> EngineResult<JobId> {
        match (when - Utc::now()).to_std() {
            Ok(delay) if !delay.is_zero() => self.schedule_after(work_type.into(), work, when, delay),
            _ => self.submit(work_type, work),
        }
    }

    /// Record a job as `Awaiting` that only runs once `parent_id` succeeded.
    ///
    /// An unknown parent is treated like a failed one.
    pub fn continue_with(
        &self,
        parent_id: JobId,
        work_type: impl Into<WorkType>,
        work: WorkUnit,
    ) -> EngineResult<JobId> {
        self.maybe_sweep();

        let job = Job::awaiting(parent_id, work_type.into(), work);
        let work_type = job.work_type.clone();
        let job_id = self.inner.store.insert(job)?;

        info!(job_id = %job_id, parent_id = %parent_id, work_type = %work_type, "continuation submitted");

        supervise(
            &self.inner,
            job_id,
            DispatchPath::Continuation,
            wait_for_parent(Arc::clone(&self.inner), job_id, parent_id),
        );
        Ok(job_id)
    }

    fn dispatch(&self, job: Job, path: DispatchPath) -> EngineResult<JobId> {
        self.maybe_sweep();

        let work_type = job.work_type.clone();
        let job_id = self.inner.store.insert(job)?;

        info!(job_id = %job_id, work_type = %work_type, path = path.as_str(), "job submitted");

        supervise(&self.inner, job_id, path, execute(Arc::clone(&self.inner), job_id));
        Ok(job_id)
    }

    fn schedule_after(
        &self,
        work_type: WorkType,
        work: WorkUnit,
        when: DateTime<Utc>,
        delay: Duration,
    ) -> EngineResult<JobId> {
        self.maybe_sweep();

        let job_id = self.inner.store.insert(Job::scheduled(work_type.clone(), work, when))?;

        info!(
            job_id = %job_id,
            work_type = %work_type,
            scheduled_for = %when,
            "job scheduled"
        );

        let inner = Arc::clone(&self.inner);
        supervise(&self.inner, job_id, DispatchPath::Delayed, async move {
            tokio::time::sleep(delay).await;
            execute(inner, job_id).await;
        });
        Ok(job_id)
    }

    // ---------------------------------------------------------------------
    // Control
    // ---------------------------------------------------------------------

    /// Soft-delete a job. Work already running is not interrupted.
    ///
    /// Returns false when the job is unknown or already deleted.
    pub fn delete(&self, job_id: JobId) -> bool {
        match self.inner.store.transition(job_id, Transition::Delete) {
            Ok(_) => {
                info!(job_id = %job_id, "job deleted");
                self.inner.completions.notify_waiters();
                true
            }
            Err(e) => {
                debug!(job_id = %job_id, error = %e, "delete rejected");
                false
            }
        }
    }

    /// Move a `Failed` job back to `Enqueued` and dispatch it again.
    ///
    /// Returns false, without touching the record, for any other state.
    pub fn requeue(&self, job_id: JobId) -> bool {
        match self.inner.store.transition(job_id, Transition::Requeue) {
            Ok(job) => {
                info!(
                    job_id = %job_id,
                    work_type = %job.work_type,
                    retry_count = job.retry_count,
                    "job requeued"
                );
                supervise(
                    &self.inner,
                    job_id,
                    DispatchPath::Requeue,
                    execute(Arc::clone(&self.inner), job_id),
                );
                true
            }
            Err(e) => {
                debug!(job_id = %job_id, error = %e, "requeue rejected");
                false
            }
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn get_job(&self, job_id: JobId) -> EngineResult<Option<Job>> {
        Ok(self.inner.store.get(job_id)?)
    }

    /// Jobs oldest first, optionally only those in `state`.
    pub fn list_jobs(&self, state: Option<JobState>) -> EngineResult<Vec<Job>> {
        Ok(self.inner.store.list(state)?)
    }

    pub fn stats(&self) -> EngineResult<JobStats> {
        let mut stats = self.inner.store.stats()?;
        stats.recurring = self.inner.ledger.len()?;
        Ok(stats)
    }

    // ---------------------------------------------------------------------
    // Recurring jobs
    // ---------------------------------------------------------------------

    /// Register or replace a recurring entry. `schedule` is stored as given.
    pub fn add_or_update_recurring(
        &self,
        id: RecurringJobId,
        work_type: impl Into<WorkType>,
        work: WorkUnit,
        schedule: impl Into<String>,
    ) -> EngineResult<RecurringJob> {
        let entry = self
            .inner
            .ledger
            .add_or_update(id, work_type.into(), work, schedule)?;

        info!(
            recurring_id = %entry.id,
            work_type = %entry.work_type,
            schedule = %entry.schedule,
            "recurring job registered"
        );
        Ok(entry)
    }

    /// Returns false when no entry had that id.
    pub fn remove_recurring(&self, id: &RecurringJobId) -> bool {
        match self.inner.ledger.remove(id) {
            Ok(Some(_)) => {
                info!(recurring_id = %id, "recurring job removed");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(recurring_id = %id, error = %e, "failed to remove recurring job");
                false
            }
        }
    }

    /// Spawn a new independent job from a recurring entry.
    pub fn trigger_recurring(&self, id: &RecurringJobId) -> Option<JobId> {
        let entry = match self.inner.ledger.get(id) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(recurring_id = %id, "trigger for unknown recurring job");
                return None;
            }
            Err(e) => {
                warn!(recurring_id = %id, error = %e, "failed to read recurring job");
                return None;
            }
        };

        let job_id = match self.dispatch(
            Job::enqueued(entry.work_type.clone(), entry.work.clone()),
            DispatchPath::Recurring,
        ) {
            Ok(job_id) => job_id,
            Err(e) => {
                warn!(recurring_id = %id, error = %e, "failed to trigger recurring job");
                return None;
            }
        };

        match self.inner.ledger.record_trigger(id, job_id, Utc::now()) {
            Ok(true) => {}
            Ok(false) => debug!(recurring_id = %id, job_id = %job_id, "recurring job removed while triggering"),
            Err(e) => warn!(recurring_id = %id, error = %e, "failed to record recurring trigger"),
        }

        info!(recurring_id = %id, job_id = %job_id, "recurring job triggered");
        Some(job_id)
    }

    pub fn get_recurring(&self, id: &RecurringJobId) -> EngineResult<Option<RecurringJob>> {
        Ok(self.inner.ledger.get(id)?)
    }

    /// Recurring entries sorted by id.
    pub fn list_recurring(&self) -> EngineResult<Vec<RecurringJob>> {
        Ok(self.inner.ledger.list()?)
    }

    // ---------------------------------------------------------------------
    // Retention
    // ---------------------------------------------------------------------

    /// Sweep if the configured interval elapsed since the last sweep.
    pub fn maybe_sweep(&self) -> Option<SweepReport> {
        let now = Utc::now();
        match self
            .inner
            .sweep_gate
            .try_claim(now, self.inner.config.retention.sweep_interval)
        {
            Ok(true) => self.run_sweep(now).ok(),
            Ok(false) => None,
            Err(e) => {
                warn!(error = %e, "retention sweep gate unavailable");
                None
            }
        }
    }

    /// Sweep now, regardless of cadence.
    pub fn sweep(&self) -> EngineResult<SweepReport> {
        let now = Utc::now();
        self.inner.sweep_gate.mark(now)?;
        Ok(self.run_sweep(now)?)
    }

    fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, JobStoreError> {
        match crate::sweep::sweep(&self.inner.store, &self.inner.config.retention, now) {
            Ok(report) => {
                if report.total() > 0 {
                    info!(
                        succeeded = report.succeeded,
                        failed = report.failed,
                        deleted = report.deleted,
                        "retention sweep reclaimed jobs"
                    );
                } else {
                    debug!("retention sweep found nothing to reclaim");
                }
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "retention sweep failed");
                Err(e)
            }
        }
    }

    /// Run the retention sweep every `sweep_interval` on a background task.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let engine = self.clone();
        let period = self
            .inner
            .config
            .retention
            .sweep_interval
            .max(Duration::from_millis(10));

        let join = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            info!(interval_secs = period.as_secs(), "retention sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = engine.sweep() {
                            warn!(error = %e, "scheduled retention sweep failed");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }

            info!("retention sweeper stopped");
        });

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }
}

/// Handle to a background sweeper started by [`JobEngine::spawn_sweeper`].
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(error = %e, "retention sweeper ended abnormally");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
