//! Nesting Tests
//!
//! Nested snapshots see their parent's writes, and applying a nested
//! snapshot makes its writes visible to the parent only.

use crate::common::*;

#[test]
fn child_apply_is_visible_to_parent_only() {
    let state = MutableState::new(0);
    let parent = take_mutable_snapshot(None, None).unwrap();
    let sibling = parent.take_nested_snapshot(None).unwrap();
    let child = parent.take_nested_mutable_snapshot(None, None).unwrap();

    child.enter(|| state.set(7).unwrap()).unwrap();
    assert!(child.apply().unwrap().is_success());
    child.dispose();

    assert_eq!(parent.enter(|| state.get().unwrap()).unwrap(), 7);
    assert_eq!(sibling.enter(|| state.get().unwrap()).unwrap(), 0);
    assert_eq!(read_fresh(&state), 0);

    assert!(parent.apply().unwrap().is_success());
    parent.dispose();
    sibling.dispose();
    assert_eq!(read_fresh(&state), 7);
}

#[test]
fn nested_snapshot_sees_parent_pending_writes() {
    let state = MutableState::new(1);
    let parent = write_in_new_snapshot(&state, 2);

    let reader = parent.take_nested_snapshot(None).unwrap();
    assert_eq!(reader.enter(|| state.get().unwrap()).unwrap(), 2);
    reader.dispose();

    let writer = parent.take_nested_mutable_snapshot(None, None).unwrap();
    assert_eq!(writer.enter(|| state.get().unwrap()).unwrap(), 2);
    writer.dispose();
    parent.dispose();
}

#[test]
fn parent_write_after_child_creation_conflicts() {
    let state = MutableState::new(0);
    let parent = take_mutable_snapshot(None, None).unwrap();
    let child = parent.take_nested_mutable_snapshot(None, None).unwrap();

    parent.enter(|| state.set(1).unwrap()).unwrap();
    child.enter(|| state.set(2).unwrap()).unwrap();

    assert!(child.apply().unwrap().is_failure());
    child.dispose();
    assert_eq!(parent.enter(|| state.get().unwrap()).unwrap(), 1);
    parent.dispose();
}

#[test]
fn nested_blocks_compose() {
    let log = MutableState::new(Vec::<&'static str>::new());

    with_mutable_snapshot(|| {
        log.update(|l| [l.as_slice(), &["outer"]].concat())?;
        with_mutable_snapshot(|| {
            log.update(|l| [l.as_slice(), &["middle"]].concat())?;
            with_mutable_snapshot(|| log.update(|l| [l.as_slice(), &["inner"]].concat()))
        })?;
        assert_eq!(read_elsewhere(&log), Vec::<&str>::new());
        Ok(())
    })
    .unwrap();

    assert_eq!(read_fresh(&log), vec!["outer", "middle", "inner"]);
}

#[test]
fn disposing_parent_fails_pending_child() {
    let state = MutableState::new(0);
    let parent = take_mutable_snapshot(None, None).unwrap();
    let child = parent.take_nested_mutable_snapshot(None, None).unwrap();
    child.enter(|| state.set(3).unwrap()).unwrap();

    parent.dispose();
    assert!(child.apply().unwrap().is_failure());
    child.dispose();
    assert_eq!(read_fresh(&state), 0);
}

#[test]
fn snapshot_kinds_follow_nesting() {
    let root = take_mutable_snapshot(None, None).unwrap();
    let nested = root.take_nested_mutable_snapshot(None, None).unwrap();
    let reader = nested.take_nested_snapshot(None).unwrap();

    assert_eq!(root.kind(), SnapshotKind::Mutable);
    assert_eq!(nested.kind(), SnapshotKind::NestedMutable);
    assert_eq!(reader.kind(), SnapshotKind::NestedReadonly);
    assert_eq!(global_snapshot().kind(), SnapshotKind::Global);

    reader.dispose();
    nested.dispose();
    root.dispose();
}
