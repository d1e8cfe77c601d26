//! `jobforge-core`: job engine building blocks.
//!
//! This crate contains **pure domain** primitives (no runtime concerns): job
//! identifiers, the job state machine, and the errors they can raise.

pub mod error;
pub mod id;
pub mod state;

pub use error::{CoreError, CoreResult};
pub use id::{JobId, RecurringJobId};
pub use state::JobState;
