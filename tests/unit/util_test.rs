//! Tests for utility functions

use orderflow::util::{join_with_timeout, now_ms, Clock, JoinOutcome, ManualClock, SystemClock};
use std::thread;
use std::time::Duration;

#[test]
fn test_now_ms_is_epoch_based() {
    // Later than 2020-01-01.
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_manual_clock_only_moves_when_told() {
    let clock = ManualClock::new();
    let shared = clock.clone();
    let before = clock.now();

    thread::sleep(Duration::from_millis(5));
    assert_eq!(clock.now(), before);

    shared.advance(Duration::from_secs(2));
    assert_eq!(clock.now() - before, Duration::from_secs(2));
    assert_eq!(clock.elapsed(), Duration::from_secs(2));
}

#[test]
fn test_system_clock_moves_forward() {
    let clock = SystemClock;
    let a = clock.now();
    thread::sleep(Duration::from_millis(2));
    assert!(clock.now() > a);
}

#[test]
fn test_join_with_timeout_detaches_stuck_thread() {
    let (tx, rx) = crossbeam_channel::bounded::<()>(0);
    let handle = thread::Builder::new()
        .name("stuck".into())
        .spawn(move || {
            let _ = rx.recv();
        })
        .unwrap();

    assert_eq!(
        join_with_timeout(handle, Duration::from_millis(20)),
        JoinOutcome::Detached
    );
    drop(tx);
}
