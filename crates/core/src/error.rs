//! Core error model.

use thiserror::Error;

use crate::state::JobState;

/// Result type used across the core layer.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core-level error.
///
/// Keep this focused on deterministic failures (parsing, state machine rules).
/// Runtime concerns belong in the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A state change is not an edge of the job state machine.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_transition(from: JobState, to: JobState) -> Self {
        Self::InvalidTransition { from, to }
    }
}
