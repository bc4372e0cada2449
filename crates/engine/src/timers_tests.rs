// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gig_core::{Clock, FakeClock};

#[test]
fn timer_lifecycle() {
    let clock = FakeClock::new();
    let mut timers = Timers::new();

    timers.set(JobId::new("job-a"), Duration::from_secs(10), clock.now());
    assert!(timers.has_timers());
    assert!(timers.next_deadline().is_some());

    // Not due yet
    clock.advance(Duration::from_secs(5));
    assert!(timers.fired(clock.now()).is_empty());
    assert!(timers.has_timers());

    // Fires and is removed
    clock.advance(Duration::from_secs(10));
    let due = timers.fired(clock.now());
    assert_eq!(due, vec![JobId::new("job-a")]);
    assert!(!timers.has_timers());
}

#[test]
fn cancel_removes_timer() {
    let clock = FakeClock::new();
    let mut timers = Timers::new();

    timers.set(JobId::new("job-a"), Duration::from_secs(10), clock.now());
    timers.cancel(&JobId::new("job-a"));

    clock.advance(Duration::from_secs(15));
    assert!(timers.fired(clock.now()).is_empty());
}

#[test]
fn setting_again_replaces_deadline() {
    let clock = FakeClock::new();
    let mut timers = Timers::new();

    timers.set(JobId::new("job-a"), Duration::from_secs(1), clock.now());
    timers.set(JobId::new("job-a"), Duration::from_secs(30), clock.now());

    clock.advance(Duration::from_secs(5));
    assert!(timers.fired(clock.now()).is_empty());
    assert!(timers.has_timers());
}

#[test]
fn next_deadline_is_earliest() {
    let clock = FakeClock::new();
    let mut timers = Timers::new();
    let now = clock.now();

    timers.set(JobId::new("job-a"), Duration::from_secs(30), now);
    timers.set(JobId::new("job-b"), Duration::from_secs(5), now);

    assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(5)));
}
