//! Scheduler - priority queue and run loop
//!
//! See `engine.rs` for the full implementation.

pub mod config;
pub mod digest;
pub mod engine;

// Re-export main types for convenience
pub use config::SchedulerConfig;
pub use engine::{
    EventScheduler, RunSummary, SchedulerError, SchedulerHandle, SchedulerStats, Step,
    StopReason,
};
