//! Conflict detection and merge installation
//!
//! For every object a snapshot modified, three records matter:
//!
//! - current: what the apply target sees now (the global view for a root
//!   snapshot, the parent's view for a nested one)
//! - previous: what the snapshot saw before its first write
//! - applied: the snapshot's own record
//!
//! If current and previous are the same record nobody else wrote the object
//! and the snapshot's record simply becomes visible when its ids close.
//! Otherwise the object's merge function decides. Merge results are
//! installed as new records under a fresh snapshot id so they win over both
//! the concurrent write and the snapshot's own.

use crate::object::{MergedRecord, StateObject};
use crate::runtime::Runtime;
use crate::snapshot::{Snapshot, SnapshotState};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::Arc;
use strata_core::{ObjectId, SnapshotId, SnapshotIdSet};
use tracing::trace;

/// The applying snapshot's view, captured at the start of apply
#[derive(Debug, Clone)]
pub(crate) struct ApplyView {
    pub(crate) id: SnapshotId,
    pub(crate) invalid: SnapshotIdSet,
    pub(crate) previous_ids: SnapshotIdSet,
}

impl ApplyView {
    pub(crate) fn of(state: &SnapshotState) -> Self {
        Self {
            id: state.id,
            invalid: state.invalid.clone(),
            previous_ids: state.previous_ids.clone(),
        }
    }

    /// Invalid set hiding every record this snapshot wrote
    fn start(&self) -> SnapshotIdSet {
        self.invalid.set(self.id).or(&self.previous_ids)
    }
}

/// Merges computed before taking the runtime lock
#[derive(Debug, Default)]
pub(crate) struct OptimisticMerges {
    entries: FxHashMap<ObjectId, (SnapshotId, MergedRecord)>,
}

impl OptimisticMerges {
    /// Reuse a merge if it was computed against the same current record
    fn take(&mut self, object_id: ObjectId, current: SnapshotId) -> Option<MergedRecord> {
        match self.entries.remove(&object_id) {
            Some((computed_against, merged)) if computed_against == current => Some(merged),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

pub(crate) enum Optimistic {
    Merges(OptimisticMerges),
    Conflict(ObjectId),
}

/// Resolve conflicts against a view that may still move
///
/// Runs without the runtime lock. Objects whose applied record cannot be
/// found are left for the locked pass.
pub(crate) fn optimistic_merges(
    view: &ApplyView,
    modified: &[Arc<dyn StateObject>],
    viewer: SnapshotId,
    current_invalid: &SnapshotIdSet,
) -> Optimistic {
    let start = view.start();
    let mut merges = OptimisticMerges::default();
    for object in modified {
        let chain = object.chain();
        let Some(current) = chain.readable_id(viewer, current_invalid) else {
            continue;
        };
        let Some(previous) = chain.readable_id(view.id, &start) else {
            continue;
        };
        if current == previous {
            continue;
        }
        let Some(applied) = chain.readable_id(view.id, &view.invalid) else {
            continue;
        };
        match object.merge_records(previous, current, applied) {
            Some(merged) => {
                merges.entries.insert(object.object_id(), (current, merged));
            }
            None => return Optimistic::Conflict(object.object_id()),
        }
    }
    trace!(target: "strata::snapshot", merges = merges.len(), "Optimistic merges computed");
    Optimistic::Merges(merges)
}

pub(crate) enum LockedApply {
    Applied {
        /// Objects where the concurrent value won; not reported as changed
        unchanged: Vec<ObjectId>,
        /// Objects that received a merged record
        merged: Vec<Arc<dyn StateObject>>,
    },
    Conflict(ObjectId),
}

enum PendingRecord {
    Copy(SnapshotId),
    Value(Box<dyn Any + Send>),
}

/// Detect conflicts and install merged records
///
/// `viewer` and `current_invalid` describe the view the snapshot applies
/// into. If any merged record is needed the snapshot advances first so the
/// merged records carry an id newer than every record they supersede.
/// Caller holds the runtime lock.
pub(crate) fn apply_locked(
    rt: &mut Runtime,
    snapshot: &Snapshot,
    modified: &[Arc<dyn StateObject>],
    mut optimistic: Option<OptimisticMerges>,
    viewer: SnapshotId,
    current_invalid: &SnapshotIdSet,
) -> LockedApply {
    let view = ApplyView::of(&snapshot.lock_state());
    let start = view.start();
    let mut pending: Vec<(&Arc<dyn StateObject>, PendingRecord)> = Vec::new();
    let mut unchanged = Vec::new();

    for object in modified {
        let object_id = object.object_id();
        let chain = object.chain();
        let Some(current) = chain.readable_id(viewer, current_invalid) else {
            continue;
        };
        let Some(previous) = chain.readable_id(view.id, &start) else {
            continue;
        };
        if current == previous {
            continue;
        }
        let Some(applied) = chain.readable_id(view.id, &view.invalid) else {
            return LockedApply::Conflict(object_id);
        };

        let merged = optimistic
            .as_mut()
            .and_then(|merges| merges.take(object_id, current))
            .or_else(|| object.merge_records(previous, current, applied));

        match merged {
            None => return LockedApply::Conflict(object_id),
            Some(MergedRecord::Applied) => {}
            Some(MergedRecord::Current) => {
                pending.push((object, PendingRecord::Copy(current)));
                unchanged.push(object_id);
            }
            Some(MergedRecord::Previous) => pending.push((object, PendingRecord::Copy(previous))),
            Some(MergedRecord::Value(value)) => {
                if !chain.accepts_value(value.as_ref()) {
                    return LockedApply::Conflict(object_id);
                }
                pending.push((object, PendingRecord::Value(value)));
            }
        }
    }

    if pending.is_empty() {
        return LockedApply::Applied {
            unchanged,
            merged: Vec::new(),
        };
    }

    snapshot.advance_locked(rt);
    let id = snapshot.lock_state().id;
    let floor = rt.reuse_floor();
    let mut merged = Vec::with_capacity(pending.len());
    for (object, record) in pending {
        let chain = object.chain();
        let installed = match record {
            PendingRecord::Copy(source) => chain.copy_record_locked(source, id, floor),
            PendingRecord::Value(value) => chain.install_value_locked(value, id, floor),
        };
        debug_assert!(installed, "merged record for {} not installed", object.object_id());
        merged.push(Arc::clone(object));
    }
    trace!(
        target: "strata::snapshot",
        snapshot_id = id,
        merged = merged.len(),
        "Merged records installed"
    );

    LockedApply::Applied { unchanged, merged }
}
