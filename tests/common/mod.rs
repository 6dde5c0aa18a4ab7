//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
pub use strata_state::*;

/// State whose merge keeps whatever was published concurrently
pub type KeepCurrent = MergeWith<fn(&i64, &i64, &i64) -> Option<i64>>;

/// Create a state whose conflicts always resolve to the published value
pub fn keep_current(value: i64) -> MutableState<i64, KeepCurrent> {
    fn current(_: &i64, current: &i64, _: &i64) -> Option<i64> {
        Some(*current)
    }
    MutableState::with_policy(value, MergeWith(current as fn(&i64, &i64, &i64) -> Option<i64>))
}

/// Read `state` in a fresh read-only snapshot
///
/// Nested in the caller's current snapshot, if any.
pub fn read_fresh<T, P>(state: &MutableState<T, P>) -> T
where
    T: Clone + Send + Sync + 'static,
    P: MutationPolicy<T>,
{
    let snapshot = take_snapshot(None).unwrap();
    let value = snapshot.enter(|| state.get().unwrap()).unwrap();
    snapshot.dispose();
    value
}

/// Read `state` from a thread with no current snapshot
///
/// Unlike [`read_fresh`] this ignores the caller's current snapshot.
pub fn read_elsewhere<T, P>(state: &MutableState<T, P>) -> T
where
    T: Clone + Send + Sync + 'static,
    P: MutationPolicy<T>,
{
    let state = state.clone();
    thread::spawn(move || state.get().unwrap()).join().unwrap()
}

/// Write and apply `value` from a thread with no current snapshot
pub fn publish_elsewhere<T, P>(state: &MutableState<T, P>, value: T)
where
    T: Clone + Send + Sync + 'static,
    P: MutationPolicy<T>,
{
    let state = state.clone();
    thread::spawn(move || with_mutable_snapshot(|| state.set(value)).unwrap())
        .join()
        .unwrap();
}

/// Take a mutable snapshot and write `value` to `state` inside it
pub fn write_in_new_snapshot<T, P>(state: &MutableState<T, P>, value: T) -> Snapshot
where
    T: Clone + Send + Sync + 'static,
    P: MutationPolicy<T>,
{
    let snapshot = take_mutable_snapshot(None, None).unwrap();
    snapshot.enter(|| state.set(value).unwrap()).unwrap();
    snapshot
}

/// Observer that records the ids of objects it sees, filtered to `ids`
pub fn recording_observer(ids: Vec<ObjectId>) -> (Arc<Mutex<Vec<ObjectId>>>, ReadObserver) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: ReadObserver = Arc::new(move |object: &dyn StateObject| {
        if ids.contains(&object.object_id()) {
            sink.lock().push(object.object_id());
        }
    });
    (seen, observer)
}
