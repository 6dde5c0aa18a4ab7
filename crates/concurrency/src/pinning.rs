//! Pinning table
//!
//! Every open snapshot pins the lowest id it may still need to read through:
//! `invalid.lowest(id)`. Every id below that pin is valid for the snapshot, so
//! among records below the global minimum pin only the youngest can ever be
//! selected. That minimum is the reclamation floor.
//!
//! The table is only touched while the runtime lock is held.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use strata_core::{SnapshotId, SnapshotIdSet};

/// Handle identifying one pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PinHandle(u64);

/// Multiset of pinned ids with handle-based release
#[derive(Debug, Default)]
pub(crate) struct PinningTable {
    /// Pinned id -> number of pins on it
    pins: BTreeMap<SnapshotId, usize>,
    /// Handle -> pinned id
    handles: FxHashMap<PinHandle, SnapshotId>,
    next_handle: u64,
}

impl PinningTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pin the lowest id a snapshot `(id, invalid)` may still read
    pub(crate) fn track(&mut self, id: SnapshotId, invalid: &SnapshotIdSet) -> PinHandle {
        self.pin(invalid.lowest(id))
    }

    pub(crate) fn pin(&mut self, id: SnapshotId) -> PinHandle {
        let handle = PinHandle(self.next_handle);
        self.next_handle += 1;
        *self.pins.entry(id).or_insert(0) += 1;
        self.handles.insert(handle, id);
        handle
    }

    /// Release a pin; releasing twice is a no-op
    pub(crate) fn release(&mut self, handle: PinHandle) -> bool {
        let Some(id) = self.handles.remove(&handle) else {
            return false;
        };
        if let Some(count) = self.pins.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(&id);
            }
        }
        true
    }

    /// Lowest pinned id, or `default` when nothing is pinned
    pub(crate) fn lowest_or(&self, default: SnapshotId) -> SnapshotId {
        self.pins.keys().next().copied().unwrap_or(default)
    }

    pub(crate) fn lowest(&self) -> Option<SnapshotId> {
        self.pins.keys().next().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}
