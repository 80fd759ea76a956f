//! Event model
//!
//! An event is a scheduled point in simulated time carrying an optional
//! zero-argument action. Each event has:
//! - A timestamp, fixed at construction
//! - An optional action (no action = pure time marker)
//! - A cancellation flag that can only go from false to true
//! - An insertion sequence, stamped by the scheduler and used as tie-break
//!
//! Events are reference handles: cloning an `Event` yields another handle to
//! the same entity, and equality is identity, never value.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

type Action<R> = Box<dyn Fn() -> Result<R, ActionError>>;

/// Error raised by an event's action
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Lifecycle of an event
///
/// ```text
/// Unscheduled → Pending → Popped → Fired
///                  │          ├──→ Failed (action returned an error)
///                  │          └──→ Skipped (cancelled)
///                  └──→ Purged (cancelled and removed eagerly)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Created but not yet handed to a scheduler
    Unscheduled,

    /// Waiting in a scheduler's queue
    Pending,

    /// Taken off the queue, not yet fired
    Popped,

    /// Action invoked (or no-op event processed)
    Fired,

    /// Action invoked and returned an error
    Failed,

    /// Popped while cancelled; action never invoked
    Skipped,

    /// Removed from the queue by `purge_cancelled`
    Purged,
}

struct EventInner<R> {
    time: f64,
    action: Option<Action<R>>,
    cancelled: Cell<bool>,
    sequence: Cell<Option<u64>>,
    owner: Cell<Option<u64>>,
    status: Cell<EventStatus>,
}

/// Handle to a scheduled point in simulated time
///
/// # Example
/// ```
/// use event_scheduler_core::Event;
///
/// let marker: Event = Event::new(5.0);
/// assert!(!marker.has_action());
///
/// let answer = Event::with_action(1.0, || 42);
/// assert_eq!(answer.invoke_action(), Ok(Some(42)));
///
/// let same = answer.clone();
/// assert!(same.ptr_eq(&answer));
/// assert_ne!(answer, Event::with_action(1.0, || 42));
/// ```
pub struct Event<R = ()> {
    inner: Rc<EventInner<R>>,
}

impl<R> Event<R> {
    /// Create a no-op event (a pure time marker)
    pub fn new(time: f64) -> Self {
        Self::build(time, None)
    }

    /// Create an event whose action cannot fail
    pub fn with_action<F>(time: f64, action: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: 'static,
    {
        Self::build(time, Some(Box::new(move || Ok(action()))))
    }

    /// Create an event whose action may fail
    ///
    /// The error is rendered with `Display` and surfaces from the run loop as
    /// `SchedulerError::Action`.
    pub fn with_fallible_action<F, E>(time: f64, action: F) -> Self
    where
        F: Fn() -> Result<R, E> + 'static,
        E: fmt::Display + 'static,
        R: 'static,
    {
        Self::build(
            time,
            Some(Box::new(move || {
                action().map_err(|e| ActionError::new(e.to_string()))
            })),
        )
    }

    fn build(time: f64, action: Option<Action<R>>) -> Self {
        Self {
            inner: Rc::new(EventInner {
                time,
                action,
                cancelled: Cell::new(false),
                sequence: Cell::new(None),
                owner: Cell::new(None),
                status: Cell::new(EventStatus::Unscheduled),
            }),
        }
    }

    /// Scheduled time
    pub fn time(&self) -> f64 {
        self.inner.time
    }

    pub fn has_action(&self) -> bool {
        self.inner.action.is_some()
    }

    /// Call the action if there is one
    ///
    /// Returns `Ok(None)` for a no-op event. Cancellation is not checked here;
    /// deciding whether to fire is the scheduler's job.
    pub fn invoke_action(&self) -> Result<Option<R>, ActionError> {
        match &self.inner.action {
            Some(action) => action().map(Some),
            None => Ok(None),
        }
    }

    /// Mark the event as cancelled
    ///
    /// Returns `true` if this call changed the flag.
    pub fn cancel(&self) -> bool {
        !self.inner.cancelled.replace(true)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
    }

    pub fn status(&self) -> EventStatus {
        self.inner.status.get()
    }

    /// Whether both handles refer to the same event
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn sequence(&self) -> Option<u64> {
        self.inner.sequence.get()
    }

    pub(crate) fn owner(&self) -> Option<u64> {
        self.inner.owner.get()
    }

    pub(crate) fn assign_sequence(&self, owner: u64, sequence: u64) {
        self.inner.owner.set(Some(owner));
        self.inner.sequence.set(Some(sequence));
    }

    pub(crate) fn set_status(&self, status: EventStatus) {
        self.inner.status.set(status);
    }
}

impl<R> Clone for Event<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R> PartialEq for Event<R> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<R> Eq for Event<R> {}

impl<R> fmt::Debug for Event<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("time", &self.time())
            .field("has_action", &self.has_action())
            .field("cancelled", &self.is_cancelled())
            .field("sequence", &self.sequence())
            .field("status", &self.status())
            .finish()
    }
}
