//! In-process job engine with continuations, recurring jobs and retention.
//!
//! ## Design
//!
//! - Jobs live in an in-memory registry; nothing survives a restart
//! - Every unit runs on its own Tokio task under a supervisor
//! - Failures are recorded on the job, never returned to the submitter
//! - Continuations wait on a parent with bounded back-off
//! - Terminal records are reclaimed by a cadence-gated sweep
//!
//! ## Components
//!
//! - `JobEngine`: submission, control and queries
//! - `JobStore`: the job registry (in-memory by default)
//! - `HandlerResolver`: produces the handler a unit of work needs
//! - `RecurringLedger`: schedule entries triggered by a host driver

pub mod config;
mod continuation;
pub mod engine;
pub mod error;
pub mod recurring;
pub mod store;
mod supervisor;
pub mod sweep;
pub mod types;
pub mod work;

pub use config::{ContinuationPolicy, EngineConfig, RetentionPolicy};
pub use engine::{EngineBuilder, JobEngine, SweeperHandle};
pub use error::{EngineError, EngineResult};
pub use jobforge_core::{JobId, JobState, RecurringJobId};
pub use recurring::RecurringLedger;
pub use store::{InMemoryJobStore, JobStore, JobStoreError, Transition};
pub use supervisor::{DispatchPath, failure_reason};
pub use sweep::SweepReport;
pub use types::{Job, JobAttempt, JobStats, RecurringJob, WorkType};
pub use work::{HandlerRegistry, HandlerResolver, HandlerScope, JobContext, NoHandlers, WorkFuture, WorkUnit};
