//! Event scheduler - the main simulation loop
//!
//! Owns the pending-event queue and the virtual clock. Events are ordered by
//! `(time, insertion sequence)`; the sequence is a per-scheduler counter
//! stamped at `schedule()`, so equal timestamps fire first-scheduled first.
//!
//! # Run Loop
//!
//! ```text
//! peek → stop condition? → pop (advance clock) → cancelled? → skip
//!                                                    └──────→ invoke action
//! ```
//!
//! # Cancellation
//!
//! Cancellation is lazy: a cancelled event stays in the queue and is skipped
//! when popped. The clock still advances to a skipped event's time, so `now`
//! is always the time of the most recently popped event (never decreasing).
//! `purge_cancelled` removes cancelled events eagerly when the queue is
//! carrying too many of them.
//!
//! # Nested Scheduling
//!
//! Every operation takes `&self`. Actions hold a `SchedulerHandle` (a weak
//! reference) and may schedule or cancel events while they are being fired;
//! the queue is never borrowed across an action call.

use crate::core::time::{SimClock, SimTime, TimeError};
use crate::models::event::{ActionError, Event, EventStatus};
use crate::models::trace::{FireLog, FireOutcome, FireRecord};
use crate::scheduler::config::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Errors surfaced by scheduler operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("Event queue is empty")]
    EmptyQueue,

    #[error("Invalid event time: {0}")]
    InvalidTime(#[from] TimeError),

    #[error("Invalid delay {0}: must be a non-negative number")]
    InvalidDelay(f64),

    #[error("Event already scheduled with sequence {sequence}")]
    AlreadyScheduled { sequence: u64 },

    #[error("Event cannot be fired from status {status:?}; pop it first")]
    NotPopped { status: EventStatus },

    #[error("Event belongs to another scheduler")]
    ForeignEvent,

    #[error("Action of event #{sequence} at time {time} failed: {source}")]
    Action {
        sequence: u64,
        time: f64,
        #[source]
        source: ActionError,
    },

    #[error("Scheduler is already firing an event")]
    Reentrant,

    #[error("Scheduler has been dropped")]
    SchedulerDropped,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Why a run call returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No pending events remain
    QueueEmpty,

    /// The next event lies beyond the time limit
    TimeLimit,

    /// The caller's stop predicate accepted the next event
    Condition,

    /// `max_events_per_run` events were taken off the queue
    EventLimit,
}

/// Result of a run call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Events whose action was invoked
    pub fired: u64,

    /// Cancelled events popped and discarded
    pub skipped: u64,

    pub stop_reason: StopReason,

    /// Clock value when the run returned
    pub final_time: Option<f64>,
}

/// Lifetime counters of a scheduler
///
/// Every scheduled event is counted exactly once in `fired`, `skipped`,
/// `failed` or `purged` once it leaves the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub fired: u64,
    pub skipped: u64,
    /// Events whose action returned an error
    pub failed: u64,
    pub purged: u64,
}

/// Outcome of firing one popped event
pub enum Step<R> {
    /// The action was invoked; `output` is `None` for a no-op event
    Fired { event: Event<R>, output: Option<R> },

    /// The event was cancelled and its action was not invoked
    Skipped { event: Event<R> },
}

impl<R> Step<R> {
    pub fn event(&self) -> &Event<R> {
        match self {
            Step::Fired { event, .. } | Step::Skipped { event } => event,
        }
    }

    pub fn is_fired(&self) -> bool {
        matches!(self, Step::Fired { .. })
    }

    /// Action output, if the action ran and had one
    pub fn into_output(self) -> Option<R> {
        match self {
            Step::Fired { output, .. } => output,
            Step::Skipped { .. } => None,
        }
    }
}

impl<R> fmt::Debug for Step<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Fired { event, output } => f
                .debug_struct("Fired")
                .field("event", event)
                .field("has_output", &output.is_some())
                .finish(),
            Step::Skipped { event } => f.debug_struct("Skipped").field("event", event).finish(),
        }
    }
}

/// Queue ordering key: time first, insertion sequence second
type QueueKey = (SimTime, u64);

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

/// Discrete-event scheduler
///
/// # Example
/// ```
/// use event_scheduler_core::{Event, EventScheduler, StopReason};
///
/// let scheduler = EventScheduler::<&str>::new();
/// scheduler.schedule(Event::with_action(2.0, || "second")).unwrap();
/// scheduler.schedule(Event::with_action(1.0, || "first")).unwrap();
///
/// let step = scheduler.step().unwrap();
/// assert_eq!(step.into_output(), Some("first"));
/// assert_eq!(scheduler.now(), Some(1.0));
///
/// let summary = scheduler.run().unwrap();
/// assert_eq!(summary.fired, 1);
/// assert_eq!(summary.stop_reason, StopReason::QueueEmpty);
/// ```
pub struct EventScheduler<R = ()> {
    id: u64,
    config: SchedulerConfig,
    queue: RefCell<BTreeMap<QueueKey, Event<R>>>,
    clock: Cell<SimClock>,
    next_sequence: Cell<u64>,
    stats: Cell<SchedulerStats>,
    fire_log: RefCell<FireLog>,
    firing: Cell<bool>,
}

impl<R> EventScheduler<R> {
    /// Create a scheduler with the default configuration
    pub fn new() -> Self {
        Self::build(SchedulerConfig::default(), None)
    }

    /// Create a scheduler from a validated configuration
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let start = config.start()?;
        Ok(Self::build(config, start))
    }

    fn build(config: SchedulerConfig, start: Option<SimTime>) -> Self {
        Self {
            id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
            config,
            queue: RefCell::new(BTreeMap::new()),
            clock: Cell::new(SimClock::new(start)),
            next_sequence: Cell::new(0),
            stats: Cell::new(SchedulerStats::default()),
            fire_log: RefCell::new(FireLog::new()),
            firing: Cell::new(false),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current simulated time, `None` before anything has been popped
    /// (unless a start time was configured)
    pub fn now(&self) -> Option<f64> {
        self.clock.get().now().map(SimTime::as_f64)
    }

    /// Number of events in the queue, cancelled ones included
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.get()
    }

    /// Snapshot of the fire log
    pub fn fire_log(&self) -> FireLog {
        self.fire_log.borrow().clone()
    }

    /// Insert an event into the queue
    ///
    /// Events earlier than `now()` are accepted; they fire next without
    /// rewinding the clock.
    pub fn schedule(&self, event: Event<R>) -> Result<Event<R>, SchedulerError> {
        if let Some(sequence) = event.sequence() {
            return Err(SchedulerError::AlreadyScheduled { sequence });
        }
        let time = SimTime::new(event.time())?;

        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);

        event.assign_sequence(self.id, sequence);
        event.set_status(EventStatus::Pending);
        self.queue.borrow_mut().insert((time, sequence), event.clone());
        self.update_stats(|s| s.scheduled += 1);

        debug!(
            sequence,
            time = time.as_f64(),
            queue_size = self.len(),
            "Event scheduled"
        );
        Ok(event)
    }

    /// Schedule `action` at an absolute time
    pub fn schedule_at<F>(&self, time: f64, action: F) -> Result<Event<R>, SchedulerError>
    where
        F: Fn() -> R + 'static,
        R: 'static,
    {
        self.schedule(Event::with_action(time, action))
    }

    /// Schedule `action` `delay` time units after `now()` (or after zero if
    /// the clock is unset)
    pub fn schedule_after<F>(&self, delay: f64, action: F) -> Result<Event<R>, SchedulerError>
    where
        F: Fn() -> R + 'static,
        R: 'static,
    {
        if delay.is_nan() || delay < 0.0 {
            return Err(SchedulerError::InvalidDelay(delay));
        }
        let base = self.now().unwrap_or(0.0);
        self.schedule_at(base + delay, action)
    }

    /// Cancel an event that has not fired yet
    ///
    /// Returns `true` if this call cancelled a queued (or popped but unfired)
    /// event. Cancelling an event that already fired, or was already
    /// cancelled, is a no-op. An unscheduled event is flagged so it will be
    /// skipped if it is scheduled later, but `false` is returned. Events
    /// queued on a different scheduler are left alone and `false` is returned.
    pub fn cancel(&self, event: &Event<R>) -> bool {
        if self.is_foreign(event) {
            debug!(sequence = ?event.sequence(), "Ignoring cancel of foreign event");
            return false;
        }
        match event.status() {
            EventStatus::Pending | EventStatus::Popped => {
                let changed = event.cancel();
                if changed {
                    debug!(sequence = ?event.sequence(), time = event.time(), "Event cancelled");
                }
                changed
            }
            EventStatus::Unscheduled => {
                event.cancel();
                false
            }
            EventStatus::Fired
            | EventStatus::Skipped
            | EventStatus::Failed
            | EventStatus::Purged => false,
        }
    }

    /// Remove every cancelled event from the queue now rather than at pop
    /// time. Returns the number removed.
    pub fn purge_cancelled(&self) -> usize {
        let mut purged = Vec::new();
        self.queue.borrow_mut().retain(|_, event| {
            if event.is_cancelled() {
                purged.push(event.clone());
                false
            } else {
                true
            }
        });

        for event in &purged {
            event.set_status(EventStatus::Purged);
        }
        let count = purged.len();
        if count > 0 {
            self.update_stats(|s| s.purged += count as u64);
            debug!(count, queue_size = self.len(), "Cancelled events purged");
        }
        count
    }

    /// Earliest pending event, without removing it
    pub fn peek(&self) -> Result<Event<R>, SchedulerError> {
        self.queue
            .borrow()
            .values()
            .next()
            .cloned()
            .ok_or(SchedulerError::EmptyQueue)
    }

    /// All pending events in fire order
    pub fn pending(&self) -> Vec<Event<R>> {
        self.queue.borrow().values().cloned().collect()
    }

    /// First pending event, in fire order, accepted by `predicate`
    ///
    /// Neither removes anything nor advances the clock. Cancelled events are
    /// offered to the predicate like any other; check `is_cancelled()` to
    /// exclude them. The predicate sees a snapshot, so it may schedule or
    /// cancel without disturbing the scan.
    pub fn next_event_by_condition<P>(&self, mut predicate: P) -> Option<Event<R>>
    where
        P: FnMut(&EventScheduler<R>, &Event<R>) -> bool,
    {
        self.pending()
            .into_iter()
            .find(|event| predicate(self, event))
    }

    /// Remove the earliest pending event and advance the clock to its time
    ///
    /// The action is not invoked; see `fire` and `step`.
    pub fn pop_next(&self) -> Result<Event<R>, SchedulerError> {
        let ((time, sequence), event) = self
            .queue
            .borrow_mut()
            .pop_first()
            .ok_or(SchedulerError::EmptyQueue)?;

        let mut clock = self.clock.get();
        if !clock.advance_to(time) {
            warn!(
                sequence,
                time = time.as_f64(),
                now = ?clock.now().map(SimTime::as_f64),
                "Popped event scheduled in the past; clock not rewound"
            );
        }
        self.clock.set(clock);

        event.set_status(EventStatus::Popped);
        Ok(event)
    }

    /// Fire an event previously returned by `pop_next`
    ///
    /// Cancelled events are skipped. An action error is returned as
    /// `SchedulerError::Action` and nothing else is fired. Events popped from
    /// another scheduler are rejected with `SchedulerError::ForeignEvent`.
    pub fn fire(&self, event: Event<R>) -> Result<Step<R>, SchedulerError> {
        let _guard = FiringGuard::enter(&self.firing)?;
        self.fire_popped(event)
    }

    /// Pop the earliest event and fire it
    pub fn step(&self) -> Result<Step<R>, SchedulerError> {
        let _guard = FiringGuard::enter(&self.firing)?;
        let event = self.pop_next()?;
        self.fire_popped(event)
    }

    /// Fire events until the queue is empty
    ///
    /// If an action fails the run stops with `SchedulerError::Action` and the
    /// partial `RunSummary` is not returned; `stats()` still counts every
    /// event the run fired, skipped or failed.
    pub fn run(&self) -> Result<RunSummary, SchedulerError> {
        self.drive(|_, _| None)
    }

    /// Fire every event with time `<= until`
    ///
    /// The clock stays at the last popped event; it does not jump to `until`.
    pub fn run_until(&self, until: f64) -> Result<RunSummary, SchedulerError> {
        let limit = SimTime::new(until)?;
        self.drive(move |_, next| {
            let beyond = SimTime::new(next.time()).map_or(true, |t| t > limit);
            beyond.then_some(StopReason::TimeLimit)
        })
    }

    /// Fire events until `stop` accepts the next pending event
    ///
    /// The accepted event stays in the queue.
    pub fn run_until_condition<P>(&self, mut stop: P) -> Result<RunSummary, SchedulerError>
    where
        P: FnMut(&EventScheduler<R>, &Event<R>) -> bool,
    {
        self.drive(move |scheduler, next| stop(scheduler, next).then_some(StopReason::Condition))
    }

    fn drive<S>(&self, mut stop: S) -> Result<RunSummary, SchedulerError>
    where
        S: FnMut(&EventScheduler<R>, &Event<R>) -> Option<StopReason>,
    {
        let _guard = FiringGuard::enter(&self.firing)?;

        info!(
            queue_size = self.len(),
            now = ?self.now(),
            "Run started"
        );

        let mut fired = 0u64;
        let mut skipped = 0u64;
        let stop_reason = loop {
            let next = match self.peek() {
                Ok(event) => event,
                Err(_) => break StopReason::QueueEmpty,
            };
            if let Some(reason) = stop(self, &next) {
                break reason;
            }
            if self
                .config
                .max_events_per_run
                .is_some_and(|limit| fired + skipped >= limit)
            {
                break StopReason::EventLimit;
            }

            let event = self.pop_next()?;
            if self.fire_popped(event)?.is_fired() {
                fired += 1;
            } else {
                skipped += 1;
            }
        };

        let summary = RunSummary {
            fired,
            skipped,
            stop_reason,
            final_time: self.now(),
        };
        info!(
            fired,
            skipped,
            stop_reason = ?stop_reason,
            final_time = ?summary.final_time,
            remaining = self.len(),
            "Run finished"
        );
        Ok(summary)
    }

    /// Scheduled on some other scheduler
    fn is_foreign(&self, event: &Event<R>) -> bool {
        matches!(event.owner(), Some(owner) if owner != self.id)
    }

    fn fire_popped(&self, event: Event<R>) -> Result<Step<R>, SchedulerError> {
        if self.is_foreign(&event) {
            return Err(SchedulerError::ForeignEvent);
        }
        let status = event.status();
        if status != EventStatus::Popped {
            return Err(SchedulerError::NotPopped { status });
        }
        // Popped events always carry a sequence
        let sequence = event.sequence().unwrap_or_default();
        let time = event.time();

        if event.is_cancelled() {
            event.set_status(EventStatus::Skipped);
            self.update_stats(|s| s.skipped += 1);
            self.record(sequence, time, FireOutcome::Skipped);
            trace!(sequence, time, "Cancelled event skipped");
            return Ok(Step::Skipped { event });
        }

        trace!(sequence, time, "Firing event");
        // Marked before invocation so the action cannot cancel its own event
        event.set_status(EventStatus::Fired);
        match event.invoke_action() {
            Ok(output) => {
                self.update_stats(|s| s.fired += 1);
                self.record(sequence, time, FireOutcome::Fired);
                Ok(Step::Fired { event, output })
            }
            Err(source) => {
                event.set_status(EventStatus::Failed);
                self.update_stats(|s| s.failed += 1);
                self.record(sequence, time, FireOutcome::Failed);
                warn!(sequence, time, error = %source, "Event action failed");
                Err(SchedulerError::Action {
                    sequence,
                    time,
                    source,
                })
            }
        }
    }

    fn record(&self, sequence: u64, time: f64, outcome: FireOutcome) {
        if self.config.record_fire_log {
            self.fire_log.borrow_mut().log(FireRecord {
                sequence,
                time,
                outcome,
            });
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl<R> EventScheduler<R> {
    /// Weak handle for use inside actions
    pub fn handle(self: &Rc<Self>) -> SchedulerHandle<R> {
        SchedulerHandle {
            inner: Rc::downgrade(self),
        }
    }
}

impl<R> Default for EventScheduler<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for EventScheduler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventScheduler")
            .field("now", &self.now())
            .field("pending", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Marks the scheduler as firing for the lifetime of the guard
struct FiringGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> FiringGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Result<Self, SchedulerError> {
        if flag.replace(true) {
            return Err(SchedulerError::Reentrant);
        }
        Ok(Self { flag })
    }
}

impl Drop for FiringGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Weak reference to a scheduler, for capture inside actions
///
/// Holding a handle does not keep the scheduler alive, so events that
/// capture one do not form a reference cycle with the queue that owns them.
///
/// # Example
/// ```
/// use std::rc::Rc;
/// use event_scheduler_core::{Event, EventScheduler};
///
/// let scheduler = Rc::new(EventScheduler::<()>::new());
/// let handle = scheduler.handle();
///
/// // An arrival at t=1 schedules its departure two time units later
/// scheduler
///     .schedule(Event::with_fallible_action(1.0, move || {
///         handle.schedule_after(2.0, || ()).map(|_| ())
///     }))
///     .unwrap();
///
/// let summary = scheduler.run().unwrap();
/// assert_eq!(summary.fired, 2);
/// assert_eq!(scheduler.now(), Some(3.0));
/// ```
pub struct SchedulerHandle<R> {
    inner: Weak<EventScheduler<R>>,
}

impl<R> SchedulerHandle<R> {
    fn upgrade(&self) -> Result<Rc<EventScheduler<R>>, SchedulerError> {
        self.inner.upgrade().ok_or(SchedulerError::SchedulerDropped)
    }

    pub fn schedule(&self, event: Event<R>) -> Result<Event<R>, SchedulerError> {
        self.upgrade()?.schedule(event)
    }

    pub fn schedule_at<F>(&self, time: f64, action: F) -> Result<Event<R>, SchedulerError>
    where
        F: Fn() -> R + 'static,
        R: 'static,
    {
        self.upgrade()?.schedule_at(time, action)
    }

    pub fn schedule_after<F>(&self, delay: f64, action: F) -> Result<Event<R>, SchedulerError>
    where
        F: Fn() -> R + 'static,
        R: 'static,
    {
        self.upgrade()?.schedule_after(delay, action)
    }

    pub fn cancel(&self, event: &Event<R>) -> Result<bool, SchedulerError> {
        Ok(self.upgrade()?.cancel(event))
    }

    pub fn now(&self) -> Result<Option<f64>, SchedulerError> {
        Ok(self.upgrade()?.now())
    }
}

impl<R> Clone for SchedulerHandle<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}
