//! Engine error model.

use thiserror::Error;

use crate::store::JobStoreError;

/// Errors surfaced synchronously by [`crate::JobEngine`].
///
/// Failures of the units of work themselves never show up here; they are
/// recorded on the job.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine was built outside a Tokio runtime.
    #[error("no tokio runtime available to run jobs")]
    NoRuntime,

    /// The job registry rejected the operation.
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;
