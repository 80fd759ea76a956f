//! Event Scheduler Core - Discrete-Event Simulation Kernel
//!
//! Time-ordered event queue with a virtual clock that advances strictly
//! event-by-event, never by wall-clock time.
//!
//! # Architecture
//!
//! - **core**: Simulated time and the virtual clock
//! - **models**: Domain types (Event, FireLog)
//! - **scheduler**: Priority queue, run loop, configuration
//!
//! # Critical Invariants
//!
//! 1. Events fire in `(time, insertion sequence)` order
//! 2. Equal timestamps fire in the order they were scheduled (FIFO)
//! 3. A cancelled event's action is never invoked
//! 4. The clock never moves backwards

// Module declarations
pub mod core;
pub mod models;
pub mod scheduler;

// Re-exports for convenience
pub use crate::core::time::{SimClock, SimTime, TimeError};
pub use models::{
    event::{ActionError, Event, EventStatus},
    trace::{FireLog, FireOutcome, FireRecord},
};
pub use scheduler::{
    EventScheduler, RunSummary, SchedulerConfig, SchedulerError, SchedulerHandle,
    SchedulerStats, Step, StopReason,
};
