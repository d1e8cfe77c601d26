//! Host-side pieces of a jobforge process: the schedule descriptor format the
//! host understands and the driver that ticks recurring jobs.

pub mod cadence;
pub mod driver;

pub use cadence::{Cadence, CadenceError};
pub use driver::RecurringDriver;
