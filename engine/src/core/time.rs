//! Simulated time for the scheduler
//!
//! Timestamps are real numbers: negative, zero, positive and infinite values
//! are all legal. NaN is rejected because it has no place in a total order.
//!
//! JSON has no literal for infinity, so timestamps are serialised through
//! [`lossless`]: finite values stay plain numbers and infinities become the
//! strings `"inf"` and `"-inf"`.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors raised when constructing a timestamp
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum TimeError {
    #[error("Simulated time must be a number, got NaN")]
    NotANumber,
}

/// A validated simulated timestamp
///
/// `-0.0` is normalised to `0.0`, so the two compare equal and fall back to
/// insertion order like any other tie.
///
/// # Example
/// ```
/// use event_scheduler_core::SimTime;
///
/// let early = SimTime::new(-1.5).unwrap();
/// let late = SimTime::new(2.0).unwrap();
/// assert!(early < late);
/// assert!(SimTime::new(f64::NAN).is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SimTime(f64);

impl SimTime {
    /// Time zero
    pub const ZERO: SimTime = SimTime(0.0);

    /// Create a timestamp, rejecting NaN
    pub fn new(value: f64) -> Result<Self, TimeError> {
        if value.is_nan() {
            return Err(TimeError::NotANumber);
        }
        // Adding +0.0 turns -0.0 into +0.0 and leaves everything else alone
        Ok(Self(value + 0.0))
    }

    /// Raw value of the timestamp
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TryFrom<f64> for SimTime {
    type Error = TimeError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        SimTime::new(value)
    }
}

impl From<SimTime> for f64 {
    fn from(time: SimTime) -> Self {
        time.0
    }
}

impl Serialize for SimTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        lossless::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for SimTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = lossless::deserialize(deserializer)?;
        SimTime::new(value).map_err(de::Error::custom)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serde adapter for `f64` that keeps infinities distinct
///
/// Plain `serde_json` writes every non-finite float as `null`, which would
/// make `+inf` and `-inf` indistinguishable in traces and digests.
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Stamp {
///     #[serde(with = "event_scheduler_core::core::time::lossless")]
///     at: f64,
/// }
///
/// let json = serde_json::to_string(&Stamp { at: f64::NEG_INFINITY }).unwrap();
/// assert_eq!(json, r#"{"at":"-inf"}"#);
/// let back: Stamp = serde_json::from_str(&json).unwrap();
/// assert_eq!(back.at, f64::NEG_INFINITY);
/// ```
pub mod lossless {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    const POS_INF: &str = "inf";
    const NEG_INF: &str = "-inf";
    const NAN: &str = "nan";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if value.is_sign_positive() {
            serializer.serialize_str(POS_INF)
        } else {
            serializer.serialize_str(NEG_INF)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl<'de> de::Visitor<'de> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "a number or one of \"{}\", \"{}\"", POS_INF, NEG_INF)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                POS_INF => Ok(f64::INFINITY),
                NEG_INF => Ok(f64::NEG_INFINITY),
                NAN => Ok(f64::NAN),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}

/// Virtual clock driven by popped events
///
/// The clock is unset until the first event is popped (or a start time is
/// configured) and is monotonically non-decreasing afterwards.
///
/// # Example
/// ```
/// use event_scheduler_core::{SimClock, SimTime};
///
/// let mut clock = SimClock::new(None);
/// assert_eq!(clock.now(), None);
///
/// clock.advance_to(SimTime::new(3.0).unwrap());
/// assert_eq!(clock.now(), Some(SimTime::new(3.0).unwrap()));
///
/// // Popping something from the past does not rewind the clock
/// assert!(!clock.advance_to(SimTime::new(1.0).unwrap()));
/// assert_eq!(clock.now(), Some(SimTime::new(3.0).unwrap()));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimClock {
    now: Option<SimTime>,
}

impl SimClock {
    /// Create a clock, optionally already set to `start`
    pub fn new(start: Option<SimTime>) -> Self {
        Self { now: start }
    }

    /// Current simulated time, `None` before the clock is first set
    pub fn now(&self) -> Option<SimTime> {
        self.now
    }

    /// Move the clock to `time`
    ///
    /// Returns `false` (and leaves the clock untouched) when `time` lies
    /// before the current time.
    pub fn advance_to(&mut self, time: SimTime) -> bool {
        match self.now {
            Some(now) if time < now => false,
            _ => {
                self.now = Some(time);
                true
            }
        }
    }
}
