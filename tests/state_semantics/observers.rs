//! Observer Tests
//!
//! Per-snapshot read and write callbacks. Global-write and apply observers
//! live in `tests/global_observers.rs`, which needs the runtime to itself.

use crate::common::*;

#[test]
fn read_observer_sees_reads_in_snapshot() {
    let a = MutableState::new(1);
    let b = MutableState::new(2);
    let (seen, observer) = recording_observer(vec![a.id(), b.id()]);

    let snapshot = take_snapshot(Some(observer)).unwrap();
    snapshot
        .enter(|| {
            a.get().unwrap();
            b.get().unwrap();
            a.get().unwrap();
        })
        .unwrap();
    snapshot.dispose();

    assert_eq!(*seen.lock(), vec![a.id(), b.id(), a.id()]);
}

#[test]
fn write_observer_sees_first_write_per_object() {
    let a = MutableState::new(1);
    let b = MutableState::new(1);
    let (seen, observer) = recording_observer(vec![a.id(), b.id()]);

    let snapshot = take_mutable_snapshot(None, Some(observer)).unwrap();
    snapshot
        .enter(|| {
            a.set(2).unwrap();
            a.set(3).unwrap();
            b.set(2).unwrap();
        })
        .unwrap();
    assert!(snapshot.apply().unwrap().is_success());
    snapshot.dispose();

    assert_eq!(*seen.lock(), vec![a.id(), b.id()]);
}

#[test]
fn observe_wraps_current_snapshot() {
    let state = MutableState::new(0);
    let (reads, read_observer) = recording_observer(vec![state.id()]);
    let (writes, write_observer) = recording_observer(vec![state.id()]);

    let snapshot = take_mutable_snapshot(None, None).unwrap();
    snapshot
        .enter(|| {
            observe(Some(read_observer), Some(write_observer), || {
                let n = state.get().unwrap();
                state.set(n + 1).unwrap();
            })
            .unwrap();
        })
        .unwrap();

    assert_eq!(reads.lock().len(), 1);
    assert_eq!(writes.lock().len(), 1);
    assert!(snapshot.has_pending_changes());
    assert!(snapshot.apply().unwrap().is_success());
    snapshot.dispose();
    assert_eq!(read_fresh(&state), 1);
}

#[test]
fn initialized_objects_report_later_writes() {
    let snapshot = take_mutable_snapshot(None, None).unwrap();
    let created = snapshot
        .enter(|| {
            let state = MutableState::new(0);
            notify_objects_initialized();
            state.set(5).unwrap();
            state
        })
        .unwrap();

    let modified: Vec<ObjectId> = snapshot
        .modified_objects()
        .iter()
        .map(|object| object.object_id())
        .collect();
    assert_eq!(modified, vec![created.id()]);
    assert!(snapshot.apply().unwrap().is_success());
    snapshot.dispose();
    assert_eq!(read_fresh(&created), 5);
}
