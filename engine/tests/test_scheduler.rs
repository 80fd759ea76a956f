//! Tests for EventScheduler queue operations
//!
//! Covers scheduling, peeking, popping and predicate search. Run loop
//! behaviour lives in test_run_loop.rs.

use event_scheduler_core::{Event, EventScheduler, EventStatus, SchedulerError, TimeError};

// ============================================================================
// Test Helpers
// ============================================================================

/// Scheduler holding three no-op events at -1, 0 and 1, scheduled in that order
fn three_markers() -> (EventScheduler, Event, Event, Event) {
    let scheduler = EventScheduler::new();
    let minus_one = scheduler.schedule(Event::new(-1.0)).unwrap();
    let zero = scheduler.schedule(Event::new(0.0)).unwrap();
    let one = scheduler.schedule(Event::new(1.0)).unwrap();
    (scheduler, minus_one, zero, one)
}

/// Scheduler holding three events at time 0 with no action, an action
/// returning nothing, and an action returning 2018
fn three_actions() -> (EventScheduler<Option<i32>>, Event<Option<i32>>, Event<Option<i32>>, Event<Option<i32>>) {
    let scheduler = EventScheduler::new();
    let no_action = scheduler.schedule(Event::new(0.0)).unwrap();
    let returns_none = scheduler.schedule(Event::with_action(0.0, || None)).unwrap();
    let returns_2018 = scheduler
        .schedule(Event::with_action(0.0, || Some(2018)))
        .unwrap();
    (scheduler, no_action, returns_none, returns_2018)
}

// ============================================================================
// Predicate Search
// ============================================================================

#[test]
fn test_condition_on_time_strict_and_non_strict_below() {
    let (scheduler, minus_one, zero, _) = three_markers();

    assert!(scheduler
        .next_event_by_condition(|_, e| e.time() < -1.0)
        .is_none());

    let found = scheduler
        .next_event_by_condition(|_, e| e.time() <= -1.0)
        .unwrap();
    assert!(found.ptr_eq(&minus_one));

    let found = scheduler
        .next_event_by_condition(|_, e| e.time() > -1.0)
        .unwrap();
    assert!(found.ptr_eq(&zero));
}

#[test]
fn test_condition_on_time_equal_and_above() {
    let (scheduler, _, zero, one) = three_markers();

    assert_eq!(
        scheduler.next_event_by_condition(|_, e| e.time() == 0.0),
        Some(zero.clone())
    );
    assert_eq!(
        scheduler.next_event_by_condition(|_, e| e.time() >= 0.0),
        Some(zero)
    );
    assert_eq!(
        scheduler.next_event_by_condition(|_, e| e.time() > 0.0),
        Some(one)
    );
    assert_eq!(
        scheduler.next_event_by_condition(|_, e| e.time() > 1.0),
        None
    );
}

#[test]
fn test_condition_on_action_result() {
    let (scheduler, no_action, _, returns_2018) = three_actions();

    // A missing action counts as returning nothing
    let found = scheduler
        .next_event_by_condition(|_, e| matches!(e.invoke_action(), Ok(None) | Ok(Some(None))))
        .unwrap();
    assert!(found.ptr_eq(&no_action));

    let found = scheduler
        .next_event_by_condition(|_, e| e.invoke_action() == Ok(Some(Some(2018))))
        .unwrap();
    assert!(found.ptr_eq(&returns_2018));
}

#[test]
fn test_condition_on_action_result_matching_nothing() {
    let (scheduler, ..) = three_actions();

    let found = scheduler.next_event_by_condition(|_, e| e.invoke_action() == Ok(Some(Some(2019))));
    assert!(found.is_none());
}

#[test]
fn test_condition_scans_ties_in_schedule_order() {
    let (scheduler, no_action, returns_none, returns_2018) = three_actions();

    let mut seen = Vec::new();
    let found = scheduler.next_event_by_condition(|_, e| {
        seen.push(e.clone());
        false
    });

    assert!(found.is_none());
    assert_eq!(seen, vec![no_action, returns_none, returns_2018]);
}

#[test]
fn test_condition_does_not_pop_or_advance_clock() {
    let (scheduler, _, _, one) = three_markers();

    let found = scheduler.next_event_by_condition(|_, e| e.time() == 1.0);

    assert_eq!(found, Some(one));
    assert_eq!(scheduler.len(), 3);
    assert_eq!(scheduler.now(), None);
}

#[test]
fn test_condition_sees_cancelled_events() {
    let (scheduler, minus_one, zero, _) = three_markers();
    scheduler.cancel(&minus_one);

    assert_eq!(
        scheduler.next_event_by_condition(|_, e| e.time() < 0.5),
        Some(minus_one)
    );
    assert_eq!(
        scheduler.next_event_by_condition(|_, e| !e.is_cancelled()),
        Some(zero)
    );
}

#[test]
fn test_condition_receives_scheduler() {
    let (scheduler, _, zero, _) = three_markers();

    let found = scheduler.next_event_by_condition(|s, e| s.len() == 3 && e.time() == 0.0);
    assert_eq!(found, Some(zero));
}

#[test]
fn test_condition_may_schedule_without_disturbing_scan() {
    let (scheduler, ..) = three_markers();

    let found = scheduler.next_event_by_condition(|s, _| {
        s.schedule(Event::new(-5.0)).unwrap();
        false
    });

    assert!(found.is_none());
    assert_eq!(scheduler.len(), 6);
}

// ============================================================================
// Pop / Peek
// ============================================================================

#[test]
fn test_pop_empty_queue() {
    let scheduler: EventScheduler = EventScheduler::new();
    assert_eq!(scheduler.pop_next(), Err(SchedulerError::EmptyQueue));
    assert_eq!(scheduler.peek(), Err(SchedulerError::EmptyQueue));
    assert!(scheduler.is_empty());
}

#[test]
fn test_pop_advances_clock_without_firing() {
    let scheduler: EventScheduler = EventScheduler::new();
    let event = scheduler
        .schedule(Event::with_action(4.5, || panic!("must not fire on pop")))
        .unwrap();

    let popped = scheduler.pop_next().unwrap();

    assert_eq!(popped, event);
    assert_eq!(popped.status(), EventStatus::Popped);
    assert_eq!(scheduler.now(), Some(4.5));
    assert!(scheduler.is_empty());
}

#[test]
fn test_peek_returns_earliest_without_removing() {
    let (scheduler, minus_one, ..) = three_markers();

    assert_eq!(scheduler.peek(), Ok(minus_one.clone()));
    assert_eq!(scheduler.peek(), Ok(minus_one));
    assert_eq!(scheduler.len(), 3);
}

#[test]
fn test_pending_in_fire_order() {
    let scheduler: EventScheduler = EventScheduler::new();
    let late = scheduler.schedule(Event::new(9.0)).unwrap();
    let tie_a = scheduler.schedule(Event::new(2.0)).unwrap();
    let tie_b = scheduler.schedule(Event::new(2.0)).unwrap();

    assert_eq!(scheduler.pending(), vec![tie_a, tie_b, late]);
}

// ============================================================================
// Schedule Validation
// ============================================================================

#[test]
fn test_schedule_returns_same_event() {
    let scheduler: EventScheduler = EventScheduler::new();
    let event = Event::new(1.0);
    let returned = scheduler.schedule(event.clone()).unwrap();

    assert!(returned.ptr_eq(&event));
    assert_eq!(event.status(), EventStatus::Pending);
}

#[test]
fn test_schedule_nan_time_rejected() {
    let scheduler: EventScheduler = EventScheduler::new();
    let result = scheduler.schedule(Event::new(f64::NAN));

    assert_eq!(
        result,
        Err(SchedulerError::InvalidTime(TimeError::NotANumber))
    );
    assert!(scheduler.is_empty());
}

#[test]
fn test_double_schedule_rejected() {
    let scheduler: EventScheduler = EventScheduler::new();
    let event = scheduler.schedule(Event::new(1.0)).unwrap();

    assert_eq!(
        scheduler.schedule(event.clone()),
        Err(SchedulerError::AlreadyScheduled { sequence: 0 })
    );
    assert_eq!(scheduler.len(), 1);
}

#[test]
fn test_fired_event_cannot_be_rescheduled() {
    let scheduler: EventScheduler = EventScheduler::new();
    let event = scheduler.schedule(Event::new(1.0)).unwrap();
    scheduler.run().unwrap();

    assert!(matches!(
        scheduler.schedule(event),
        Err(SchedulerError::AlreadyScheduled { .. })
    ));
}

#[test]
fn test_event_in_past_accepted() {
    let scheduler: EventScheduler = EventScheduler::new();
    scheduler.schedule(Event::new(10.0)).unwrap();
    scheduler.step().unwrap();

    let past = scheduler.schedule(Event::new(-3.0)).unwrap();
    assert_eq!(scheduler.peek(), Ok(past));
}

#[test]
fn test_schedule_after_uses_current_time() {
    let scheduler: EventScheduler = EventScheduler::new();
    let first = scheduler.schedule_after(2.0, || ()).unwrap();
    assert_eq!(first.time(), 2.0);

    scheduler.step().unwrap();
    let second = scheduler.schedule_after(0.5, || ()).unwrap();
    assert_eq!(second.time(), 2.5);
}

#[test]
fn test_schedule_after_rejects_bad_delay() {
    let scheduler: EventScheduler = EventScheduler::new();
    assert_eq!(
        scheduler.schedule_after(-1.0, || ()).unwrap_err(),
        SchedulerError::InvalidDelay(-1.0)
    );
    assert!(matches!(
        scheduler.schedule_after(f64::NAN, || ()),
        Err(SchedulerError::InvalidDelay(_))
    ));
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancel_pending_event() {
    let (scheduler, _, zero, _) = three_markers();

    assert!(scheduler.cancel(&zero));
    assert!(!scheduler.cancel(&zero));
    assert!(zero.is_cancelled());
    // Lazy deletion: still physically queued
    assert_eq!(scheduler.len(), 3);
}

#[test]
fn test_cancel_after_fire_is_noop() {
    let scheduler: EventScheduler = EventScheduler::new();
    let event = scheduler.schedule(Event::new(1.0)).unwrap();
    scheduler.step().unwrap();

    assert!(!scheduler.cancel(&event));
    assert!(!event.is_cancelled());
    assert_eq!(event.status(), EventStatus::Fired);
}

#[test]
fn test_cancel_ignores_event_of_other_scheduler() {
    let owner: EventScheduler = EventScheduler::new();
    let other: EventScheduler = EventScheduler::new();
    let event = owner.schedule(Event::new(1.0)).unwrap();

    assert!(!other.cancel(&event));
    assert!(!event.is_cancelled());
    assert!(owner.step().unwrap().is_fired());
}

#[test]
fn test_fire_rejects_event_popped_elsewhere() {
    let owner: EventScheduler = EventScheduler::new();
    let other: EventScheduler = EventScheduler::new();
    owner.schedule(Event::new(1.0)).unwrap();
    let popped = owner.pop_next().unwrap();

    assert!(matches!(
        other.fire(popped.clone()),
        Err(SchedulerError::ForeignEvent)
    ));
    assert_eq!(popped.status(), EventStatus::Popped);
    assert!(owner.fire(popped).unwrap().is_fired());
}

#[test]
fn test_purge_cancelled() {
    let (scheduler, minus_one, zero, one) = three_markers();
    scheduler.cancel(&minus_one);
    scheduler.cancel(&one);

    assert_eq!(scheduler.purge_cancelled(), 2);
    assert_eq!(scheduler.pending(), vec![zero]);
    assert_eq!(minus_one.status(), EventStatus::Purged);
    assert_eq!(scheduler.stats().purged, 2);
    assert_eq!(scheduler.purge_cancelled(), 0);
}
