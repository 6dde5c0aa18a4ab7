//! Atomicity Tests
//!
//! An apply publishes all of a snapshot's writes together, or none of them.

use crate::common::*;

#[test]
fn successful_apply_publishes_every_write() {
    let states: Vec<_> = (0..8).map(MutableState::new).collect();
    let snapshot = take_mutable_snapshot(None, None).unwrap();
    snapshot
        .enter(|| {
            for state in &states {
                state.update(|n| n * 10).unwrap();
            }
        })
        .unwrap();

    let before: Vec<i32> = states.iter().map(read_fresh).collect();
    assert_eq!(before, (0..8).collect::<Vec<_>>());
    assert!(snapshot.apply().unwrap().is_success());
    snapshot.dispose();

    let values: Vec<i32> = states.iter().map(read_fresh).collect();
    assert_eq!(values, (0..8).map(|n| n * 10).collect::<Vec<_>>());
}

#[test]
fn failed_apply_publishes_nothing() {
    let untouched = MutableState::new(1);
    let contested = MutableState::new(1);

    let loser = take_mutable_snapshot(None, None).unwrap();
    loser
        .enter(|| {
            untouched.set(2).unwrap();
            contested.set(2).unwrap();
        })
        .unwrap();

    publish_elsewhere(&contested, 3);

    assert!(loser.apply().unwrap().is_failure());
    loser.dispose();

    assert_eq!(read_fresh(&untouched), 1);
    assert_eq!(read_fresh(&contested), 3);
}

#[test]
fn block_error_publishes_nothing() {
    let a = MutableState::new(0);
    let b = MutableState::new(0);

    let result: Result<()> = with_mutable_snapshot(|| {
        a.set(1)?;
        b.set(1)?;
        Err(Error::Unsupported("abort".to_string()))
    });

    assert!(result.is_err());
    assert_eq!((read_fresh(&a), read_fresh(&b)), (0, 0));
}

#[test]
fn apply_notifies_with_complete_change_set() {
    let a = MutableState::new(0);
    let b = MutableState::new(0);
    let ids = [a.id(), b.id()];
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);

    let handle = register_apply_observer(move |changed, _| {
        let mut batch: Vec<ObjectId> = changed
            .iter()
            .map(|object| object.object_id())
            .filter(|id| ids.contains(id))
            .collect();
        if !batch.is_empty() {
            batch.sort();
            sink.lock().push(batch);
        }
    });

    with_mutable_snapshot(|| {
        a.set(1)?;
        b.set(1)
    })
    .unwrap();
    handle.dispose();

    let mut expected = ids.to_vec();
    expected.sort();
    assert_eq!(*seen.lock(), vec![expected]);
}
