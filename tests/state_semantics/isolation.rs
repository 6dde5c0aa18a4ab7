//! Isolation Tests
//!
//! A snapshot reads every object as it was when the snapshot was taken,
//! regardless of what is applied while it stays open.

use crate::common::*;

#[test]
fn readonly_snapshot_keeps_pre_apply_value() {
    let state = MutableState::new(0);
    let reader = take_snapshot(None).unwrap();

    publish_elsewhere(&state, 1);

    assert_eq!(reader.enter(|| state.get().unwrap()).unwrap(), 0);
    reader.dispose();
    assert_eq!(read_fresh(&state), 1);
}

#[test]
fn mutable_snapshot_keeps_pre_apply_value() {
    let state = MutableState::new(String::from("before"));
    let other = MutableState::new(0);
    let snapshot = write_in_new_snapshot(&other, 1);

    publish_elsewhere(&state, String::from("after"));

    assert_eq!(snapshot.enter(|| state.get().unwrap()).unwrap(), "before");
    snapshot.dispose();
}

#[test]
fn pending_writes_are_private() {
    let state = MutableState::new(0);
    let writer = write_in_new_snapshot(&state, 9);

    assert_eq!(read_fresh(&state), 0);
    assert_eq!(state.get().unwrap(), 0);
    assert_eq!(writer.enter(|| state.get().unwrap()).unwrap(), 9);

    writer.dispose();
    assert_eq!(read_fresh(&state), 0);
}

#[test]
fn many_readers_each_see_their_own_moment() {
    let state = MutableState::new(0);
    let mut readers = Vec::new();
    for value in 1..=5 {
        readers.push(take_snapshot(None).unwrap());
        publish_elsewhere(&state, value);
    }

    for (expected, reader) in readers.iter().enumerate() {
        assert_eq!(reader.enter(|| state.get().unwrap()).unwrap(), expected as i32);
        reader.dispose();
    }
    assert_eq!(read_fresh(&state), 5);
}

#[test]
fn reading_outside_snapshot_tracks_latest_publication() {
    let state = MutableState::new(vec![1]);
    publish_elsewhere(&state, vec![1, 2]);
    assert_eq!(state.get().unwrap(), vec![1, 2]);
    publish_elsewhere(&state, vec![]);
    assert!(state.get().unwrap().is_empty());
}
