//! The global snapshot and root snapshot creation
//!
//! ## Advancing the Global Snapshot
//!
//! ```text
//! 1. Lock runtime
//! 2. invalid = open - {global id}       (what the new root snapshot hides)
//! 3. Optionally open a root snapshot with that invalid set
//! 4. Replace the global: close its id, open a fresh one
//! 5. Collect the old global's modified objects
//! 6. Unlock, notify apply observers
//! 7. Lock again, reclaim unreachable records
//! ```
//!
//! Writes made with no snapshot entered go to the global snapshot under its
//! current id. They become visible to new snapshots only once the global
//! advances, which happens whenever a root snapshot is taken, a root snapshot
//! applies, or `send_apply_notifications` finds pending changes.

use super::{sorted_objects, Access, Placement, Snapshot};
use crate::object::StateObject;
use crate::observer::{notify_apply, ReadObserver, WriteObserver};
use crate::pinning::PinHandle;
use crate::runtime::{global_snapshot, with_runtime, Runtime};
use std::sync::Arc;
use strata_core::{SnapshotId, SnapshotIdSet};
use tracing::debug;

impl Snapshot {
    pub(crate) fn new_global(id: SnapshotId, invalid: SnapshotIdSet, pin: PinHandle) -> Self {
        Snapshot::build(
            Access::Mutable,
            Placement::Global,
            None,
            Vec::new(),
            Vec::new(),
            id,
            invalid,
            Some(pin),
        )
    }

    /// Detach a replaced global snapshot from the runtime
    ///
    /// Returns its pin for the caller to release. Later writes through a
    /// stale handle re-resolve to the live global.
    pub(crate) fn retire_global_locked(&self) -> Option<PinHandle> {
        let mut state = self.lock_state();
        state.closed = true;
        state.pin.take()
    }

    /// Modified objects of a retired global, sorted by id
    pub(crate) fn take_modified_locked(&self) -> Vec<Arc<dyn StateObject>> {
        let modified = std::mem::take(&mut self.lock_state().modified);
        sorted_objects(modified.into_values().collect())
    }
}

/// Take a root snapshot, advancing the global snapshot
pub(super) fn take_root_snapshot(
    access: Access,
    read_observers: Vec<ReadObserver>,
    write_observers: Vec<WriteObserver>,
) -> Snapshot {
    let snapshot = advance_global_with(|rt, invalid| {
        let id = rt.open_new_id();
        let pin = rt.track_pinning(id, &invalid);
        Snapshot::build(
            access,
            Placement::Root,
            None,
            read_observers,
            write_observers,
            id,
            invalid,
            Some(pin),
        )
    });
    debug!(
        target: "strata::snapshot",
        snapshot_id = snapshot.id(),
        kind = ?snapshot.kind(),
        "Snapshot taken"
    );
    snapshot
}

/// Replace the global snapshot, running `f` first under the same lock
///
/// `f` receives the set of ids a root snapshot opened right now must treat
/// as invalid.
fn advance_global_with<R>(f: impl FnOnce(&mut Runtime, SnapshotIdSet) -> R) -> R {
    let (result, previous, changed, observers) = with_runtime(|rt| {
        let invalid = rt.open_snapshots.clear(rt.global.id());
        let result = f(rt, invalid);
        let previous = rt.take_new_global_locked();
        let changed = previous.take_modified_locked();
        let observers = if changed.is_empty() {
            Vec::new()
        } else {
            rt.apply_observers.snapshot()
        };
        (result, previous, changed, observers)
    });

    if !changed.is_empty() {
        debug!(
            target: "strata::snapshot",
            snapshot_id = previous.id(),
            changed = changed.len(),
            "Global snapshot published"
        );
    }
    notify_apply(&observers, &changed, &previous);
    reclaim_after_publication(&changed);
    result
}

/// Publish pending global writes by replacing the global snapshot
pub(crate) fn advance_global_snapshot() {
    advance_global_with(|_, _| ());
}

/// Run the reclamation pass after a publication
pub(crate) fn reclaim_after_publication<'a>(objects: impl IntoIterator<Item = &'a Arc<dyn StateObject>>) {
    with_runtime(|rt| {
        rt.check_and_overwrite_unused_records_locked();
        for object in objects {
            rt.process_for_unused_records_locked(object);
        }
    });
}

/// Publish writes made outside any snapshot
///
/// Writes to the global snapshot are batched; this advances the global
/// snapshot if any are pending so that apply observers see them. Does
/// nothing when there are none.
pub fn send_apply_notifications() {
    if global_snapshot().has_pending_changes() {
        advance_global_snapshot();
    }
}
