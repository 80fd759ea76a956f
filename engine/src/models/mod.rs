//! Domain models for the scheduler

pub mod event;
pub mod trace;

// Re-exports
pub use event::{ActionError, Event, EventStatus};
pub use trace::{FireLog, FireOutcome, FireRecord};
