//! Process-wide snapshot runtime
//!
//! One lazily initialized struct, guarded by one mutex, holds every piece of
//! shared bookkeeping:
//! - the next snapshot id and the set of open snapshot ids
//! - the pinning table
//! - the current global snapshot
//! - apply and global-write observer lists
//! - the working set of objects holding more than one live record
//!
//! The same lock serializes structural edits of record chains.
//!
//! # Lock Ordering
//!
//! The runtime lock is always taken before any snapshot's state lock, and at
//! most one snapshot state lock is held at a time. Observers are never
//! invoked while the runtime lock is held.

use crate::observer::{ApplyObserver, ObserverList, WriteObserver};
use crate::object::StateObject;
use crate::pinning::{PinHandle, PinningTable};
use crate::snapshot::Snapshot;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Weak;
use strata_core::{ObjectId, SnapshotId, SnapshotIdSet, FIRST_SNAPSHOT};
use tracing::{debug, info};

/// Tunable runtime behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Compute conflict merges outside the runtime lock before applying
    pub optimistic_merge: bool,
    /// Recycle unreachable records after each publication
    pub reclaim_records: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            optimistic_merge: true,
            reclaim_records: true,
        }
    }
}

pub(crate) struct Runtime {
    pub(crate) next_snapshot_id: SnapshotId,
    pub(crate) open_snapshots: SnapshotIdSet,
    pub(crate) pins: PinningTable,
    pub(crate) global: Snapshot,
    pub(crate) apply_observers: ObserverList<ApplyObserver>,
    pub(crate) global_write_observers: ObserverList<WriteObserver>,
    pub(crate) extra_state_objects: FxHashMap<ObjectId, Weak<dyn StateObject>>,
    pub(crate) options: RuntimeOptions,
    /// Whether global replacements are mirrored into `CURRENT_GLOBAL`
    publishes_global: bool,
}

static RUNTIME: Lazy<Mutex<Runtime>> =
    Lazy::new(|| Mutex::new(Runtime::process(RuntimeOptions::default())));

/// Mirror of the process runtime's global snapshot
///
/// Written only while the runtime lock is held, so readers can find the
/// current global snapshot without taking the runtime lock.
static CURRENT_GLOBAL: RwLock<Option<Snapshot>> = parking_lot::const_rwlock(None);

impl Runtime {
    pub(crate) fn new(options: RuntimeOptions) -> Self {
        let mut pins = PinningTable::new();
        let global_id = FIRST_SNAPSHOT;
        let invalid = SnapshotIdSet::EMPTY;
        let pin = pins.track(global_id, &invalid);
        let global = Snapshot::new_global(global_id, invalid, pin);

        Self {
            next_snapshot_id: global_id + 1,
            open_snapshots: SnapshotIdSet::EMPTY.set(global_id),
            pins,
            global,
            apply_observers: ObserverList::new(),
            global_write_observers: ObserverList::new(),
            extra_state_objects: FxHashMap::default(),
            options,
            publishes_global: false,
        }
    }

    /// The runtime behind `RUNTIME`, mirroring its global snapshot
    fn process(options: RuntimeOptions) -> Self {
        let mut runtime = Self::new(options);
        runtime.publishes_global = true;
        *CURRENT_GLOBAL.write() = Some(runtime.global.clone());
        runtime
    }

    /// Allocate a snapshot id and mark it open
    pub(crate) fn open_new_id(&mut self) -> SnapshotId {
        let id = self.next_snapshot_id;
        self.next_snapshot_id += 1;
        self.open_snapshots = self.open_snapshots.set(id);
        id
    }

    pub(crate) fn track_pinning(&mut self, id: SnapshotId, invalid: &SnapshotIdSet) -> PinHandle {
        self.pins.track(id, invalid)
    }

    pub(crate) fn release_pins(&mut self, pins: impl IntoIterator<Item = PinHandle>) {
        for pin in pins {
            self.pins.release(pin);
        }
    }

    /// Lowest pinned id, or the next id when nothing is pinned
    pub(crate) fn reuse_floor(&self) -> SnapshotId {
        self.pins.lowest_or(self.next_snapshot_id)
    }

    /// Remove a snapshot's ids from the open set, making its records visible
    pub(crate) fn close_ids(&mut self, id: SnapshotId, previous_ids: &SnapshotIdSet) {
        self.open_snapshots = self.open_snapshots.clear(id).and_not(previous_ids);
    }

    /// Replace the global snapshot with a fresh one
    ///
    /// Closes the previous global's id, so its writes become visible to
    /// every snapshot created afterward. Returns the previous global.
    pub(crate) fn take_new_global_locked(&mut self) -> Snapshot {
        let previous = self.global.clone();
        let previous_id = previous.id();
        let global_id = self.next_snapshot_id;
        self.next_snapshot_id += 1;
        self.open_snapshots = self.open_snapshots.clear(previous_id);

        let invalid = self.open_snapshots.clone();
        let pin = self.pins.track(global_id, &invalid);
        self.global = Snapshot::new_global(global_id, invalid, pin);
        if self.publishes_global {
            *CURRENT_GLOBAL.write() = Some(self.global.clone());
        }

        if let Some(pin) = previous.retire_global_locked() {
            self.pins.release(pin);
        }
        self.open_snapshots = self.open_snapshots.set(global_id);
        previous
    }
}

/// Run `f` with the runtime lock held
///
/// `f` must not invoke observers or call back into any API that takes the
/// runtime lock.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    let mut runtime = RUNTIME.lock();
    f(&mut runtime)
}

/// The current global snapshot
pub fn global_snapshot() -> Snapshot {
    if let Some(global) = CURRENT_GLOBAL.read().as_ref() {
        return global.clone();
    }
    with_runtime(|rt| rt.global.clone())
}

/// Install runtime options
pub fn configure_runtime(options: RuntimeOptions) {
    with_runtime(|rt| rt.options = options);
    info!(
        target: "strata::snapshot",
        optimistic_merge = options.optimistic_merge,
        reclaim_records = options.reclaim_records,
        "Runtime options installed"
    );
}

/// Currently installed runtime options
pub fn runtime_options() -> RuntimeOptions {
    with_runtime(|rt| rt.options)
}

/// Ids of every open snapshot, including the global snapshot
pub fn open_snapshot_ids() -> SnapshotIdSet {
    with_runtime(|rt| rt.open_snapshots.clone())
}

/// Lowest pinned snapshot id, if any snapshot is pinned
pub fn lowest_pinned() -> Option<SnapshotId> {
    with_runtime(|rt| rt.pins.lowest())
}

/// Number of active pins
pub fn pinned_count() -> usize {
    with_runtime(|rt| rt.pins.len())
}

/// Number of objects in the reclamation working set
pub fn tracked_object_count() -> usize {
    with_runtime(|rt| rt.extra_state_objects.len())
}

/// Rebuild the runtime from scratch
///
/// Snapshots and objects created before the reset keep working against the
/// old ids but are no longer tracked. Only intended for tests that need a
/// pristine id space, each in its own process.
#[doc(hidden)]
pub fn reset_runtime_for_tests() {
    let mut runtime = RUNTIME.lock();
    let options = runtime.options;
    *runtime = Runtime::process(options);
    debug!(target: "strata::snapshot", "Runtime reset");
}
