//! Fire trace for replay checks and auditing.
//!
//! Every event the run loop takes off the queue is recorded, in order, as a
//! `FireRecord`. Two runs that fire the same events in the same order produce
//! identical logs and therefore identical digests.
//!
//! # Example
//!
//! ```rust
//! use event_scheduler_core::models::{FireLog, FireOutcome, FireRecord};
//!
//! let mut log = FireLog::new();
//! log.log(FireRecord { sequence: 0, time: 1.0, outcome: FireOutcome::Fired });
//! log.log(FireRecord { sequence: 1, time: 1.0, outcome: FireOutcome::Skipped });
//!
//! assert_eq!(log.fired().len(), 1);
//! assert_eq!(log.at_time(1.0).len(), 2);
//! ```

use crate::scheduler::digest::canonical_hash;
use crate::scheduler::SchedulerError;
use serde::{Deserialize, Serialize};

/// What the run loop did with a popped event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireOutcome {
    /// Action invoked (or no-op event processed)
    Fired,

    /// Event was cancelled; action not invoked
    Skipped,

    /// Action invoked and returned an error; the run stopped here
    Failed,
}

/// One entry of the fire trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireRecord {
    /// Insertion sequence assigned at schedule time
    pub sequence: u64,

    /// Event time (infinities serialise as `"inf"` / `"-inf"`)
    #[serde(with = "crate::core::time::lossless")]
    pub time: f64,

    pub outcome: FireOutcome,
}

/// Ordered record of fired and skipped events.
///
/// This is a simple wrapper around Vec<FireRecord> with convenience methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FireLog {
    records: Vec<FireRecord>,
}

impl FireLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Append a record
    pub fn log(&mut self, record: FireRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in fire order
    pub fn records(&self) -> &[FireRecord] {
        &self.records
    }

    /// Records whose action was invoked
    pub fn fired(&self) -> Vec<&FireRecord> {
        self.with_outcome(FireOutcome::Fired)
    }

    /// Records skipped because the event was cancelled
    pub fn skipped(&self) -> Vec<&FireRecord> {
        self.with_outcome(FireOutcome::Skipped)
    }

    /// Records whose action returned an error
    pub fn failed(&self) -> Vec<&FireRecord> {
        self.with_outcome(FireOutcome::Failed)
    }

    /// Records at exactly `time`
    pub fn at_time(&self, time: f64) -> Vec<&FireRecord> {
        self.records.iter().filter(|r| r.time == time).collect()
    }

    /// SHA-256 of the canonical JSON encoding of the records
    pub fn digest(&self) -> Result<String, SchedulerError> {
        canonical_hash(&self.records)
    }

    /// Clear all records
    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn with_outcome(&self, outcome: FireOutcome) -> Vec<&FireRecord> {
        self.records.iter().filter(|r| r.outcome == outcome).collect()
    }
}
