//! Scheduler configuration
//!
//! Configuration is plain data, loadable from JSON:
//!
//! ```json
//! { "start_time": 0.0, "max_events_per_run": 10000, "record_fire_log": true }
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use crate::core::time::SimTime;
use crate::scheduler::digest::canonical_hash;
use crate::scheduler::SchedulerError;
use serde::{Deserialize, Serialize};

/// Scheduler configuration
///
/// # Example
/// ```
/// use event_scheduler_core::SchedulerConfig;
///
/// let config = SchedulerConfig::from_json(r#"{ "record_fire_log": true }"#).unwrap();
/// assert!(config.record_fire_log);
/// assert_eq!(config.start_time, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Initial clock value (None = clock unset until the first pop).
    /// Must be finite.
    pub start_time: Option<f64>,

    /// Maximum number of events taken off the queue by a single run call
    /// (None = unbounded)
    pub max_events_per_run: Option<u64>,

    /// Record every popped event in the fire log
    pub record_fire_log: bool,
}

impl SchedulerConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, SchedulerError> {
        let config: SchedulerConfig = serde_json::from_str(json)
            .map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.start()?;
        if self.max_events_per_run == Some(0) {
            return Err(SchedulerError::InvalidConfig(
                "max_events_per_run must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Start time as a validated timestamp
    pub fn start(&self) -> Result<Option<SimTime>, SchedulerError> {
        match self.start_time {
            Some(t) if t.is_infinite() => Err(SchedulerError::InvalidConfig(format!(
                "start_time must be finite, got {}",
                t
            ))),
            start => start
                .map(SimTime::new)
                .transpose()
                .map_err(|e| SchedulerError::InvalidConfig(format!("start_time: {}", e))),
        }
    }

    /// SHA-256 fingerprint of this configuration
    ///
    /// Invalid configurations are rejected rather than hashed.
    pub fn config_hash(&self) -> Result<String, SchedulerError> {
        self.validate()?;
        canonical_hash(self)
    }
}
