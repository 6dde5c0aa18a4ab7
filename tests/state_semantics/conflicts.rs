//! Conflict Tests
//!
//! Concurrent writes to the same object from the same prior version never
//! both apply unless the object's policy merges them.

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn second_writer_from_same_version_fails() {
    let state = MutableState::new(0);
    let first = write_in_new_snapshot(&state, 1);
    let second = write_in_new_snapshot(&state, 2);

    assert!(first.apply().unwrap().is_success());
    let outcome = second.apply().unwrap();
    assert!(outcome.is_failure());
    assert!(matches!(outcome.check(), Err(Error::ApplyConflict { .. })));

    first.dispose();
    second.dispose();
    assert_eq!(read_fresh(&state), 1);
}

#[test]
fn exactly_one_racing_writer_wins() {
    for _ in 0..20 {
        let state = MutableState::new(0);
        let ready = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [1, 2]
            .into_iter()
            .map(|value| {
                let state = state.clone();
                let ready = Arc::clone(&ready);
                thread::spawn(move || {
                    let snapshot = write_in_new_snapshot(&state, value);
                    ready.wait();
                    let applied = snapshot.apply().unwrap().is_success();
                    snapshot.dispose();
                    (value, applied)
                })
            })
            .collect();

        let outcomes: Vec<(i32, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<i32> = outcomes
            .iter()
            .filter(|(_, applied)| *applied)
            .map(|(value, _)| *value)
            .collect();
        assert_eq!(winners.len(), 1, "outcomes: {:?}", outcomes);
        assert_eq!(read_fresh(&state), winners[0]);
    }
}

#[test]
fn keep_current_merge_never_fails() {
    let state = keep_current(0);
    let writers: Vec<_> = (1..=5).map(|value| write_in_new_snapshot(&state, value)).collect();

    for writer in &writers {
        assert!(writer.apply().unwrap().is_success());
        writer.dispose();
    }
    assert_eq!(read_fresh(&state), 1);
}

#[test]
fn keep_current_merge_under_threads() {
    let state = keep_current(0);
    let ready = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (1..=4)
        .map(|value| {
            let state = state.clone();
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                ready.wait();
                for round in 0..25 {
                    with_mutable_snapshot(|| state.set(value * 100 + round)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn identical_concurrent_values_do_not_conflict() {
    let state = MutableState::new(String::from("a"));
    let first = write_in_new_snapshot(&state, String::from("b"));
    let second = write_in_new_snapshot(&state, String::from("b"));

    assert!(first.apply().unwrap().is_success());
    assert!(second.apply().unwrap().is_success());
    first.dispose();
    second.dispose();
    assert_eq!(read_fresh(&state), "b");
}

#[test]
fn failed_snapshot_can_be_retried_from_scratch() {
    let state = MutableState::new(10);
    let stale = take_mutable_snapshot(None, None).unwrap();
    stale.enter(|| state.update(|n| n + 1).unwrap()).unwrap();
    publish_elsewhere(&state, 20);

    assert!(stale.apply().unwrap().is_failure());
    stale.dispose();

    with_mutable_snapshot(|| state.update(|n| n + 1)).unwrap();
    assert_eq!(read_fresh(&state), 21);
}

#[test]
fn retry_helper_absorbs_conflicts() {
    let counter = MutableState::new(0u64);
    let config = RetryConfig::default().reruns(1_000).backoff(0, 1);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let counter = counter.clone();
            let config = config.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    with_mutable_snapshot_retry(&config, || counter.update(|n| n + 1)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(read_fresh(&counter), 200);
}
