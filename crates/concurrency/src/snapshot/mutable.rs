//! Mutable snapshots: root apply, dispose and abandon
//!
//! ## Apply Sequence
//!
//! ```text
//! 1. Validate (not disposed, not applied)
//! 2. Optimistic merge: resolve conflicts against the live global view
//!    without the runtime lock. A conflict here fails the apply at once.
//! 3. Lock runtime
//! 4. Re-validate, recompute conflicts against the now-stable view, reusing
//!    optimistic merges whose current record has not moved
//! 5. Install merged records under a fresh id
//! 6. Close this snapshot's ids and replace the global snapshot
//! 7. Unlock, notify apply observers
//! 8. Lock again, release pins, reclaim records
//! ```
//!
//! Nothing becomes visible to other snapshots before step 6, and a failed
//! apply leaves the snapshot open so the caller can dispose it.

use super::{Placement, Snapshot, SnapshotApplyResult};
use crate::apply::{apply_locked, optimistic_merges, ApplyView, LockedApply, Optimistic};
use crate::object::StateObject;
use crate::observer::{notify_apply, ApplyObserver};
use crate::runtime::{with_runtime, Runtime};
use std::sync::{Arc, Weak};
use strata_core::{ObjectId, Result, SnapshotId};
use tracing::debug;

/// Everything gathered under the lock that must be handled after it
struct Publication {
    id: SnapshotId,
    global_changed: Vec<Arc<dyn StateObject>>,
    changed: Vec<Arc<dyn StateObject>>,
    merged: Vec<Arc<dyn StateObject>>,
    observers: Vec<ApplyObserver>,
}

impl Snapshot {
    pub(super) fn apply_root(&self) -> Result<SnapshotApplyResult> {
        let (modified, view) = {
            let state = self.lock_state();
            state.ensure_open()?;
            (state.modified_sorted(), ApplyView::of(&state))
        };

        let mut optimistic = None;
        if !modified.is_empty() {
            let live_view = with_runtime(|rt| {
                rt.options.optimistic_merge.then(|| {
                    let global_id = rt.global.id();
                    (global_id, rt.open_snapshots.clear(global_id))
                })
            });
            if let Some((viewer, current_invalid)) = live_view {
                match optimistic_merges(&view, &modified, viewer, &current_invalid) {
                    Optimistic::Merges(merges) => optimistic = Some(merges),
                    Optimistic::Conflict(object_id) => {
                        self.log_conflict(object_id);
                        return Ok(SnapshotApplyResult::Failure(self.clone()));
                    }
                }
            }
        }

        let publication = with_runtime(|rt| -> Result<std::result::Result<Publication, ObjectId>> {
            self.lock_state().ensure_open()?;

            let mut unchanged = Vec::new();
            let mut merged = Vec::new();
            if !modified.is_empty() {
                let viewer = rt.next_snapshot_id;
                let current_invalid = rt.open_snapshots.clear(rt.global.id());
                match apply_locked(rt, self, &modified, optimistic, viewer, &current_invalid) {
                    LockedApply::Applied {
                        unchanged: skipped,
                        merged: installed,
                    } => {
                        unchanged = skipped;
                        merged = installed;
                    }
                    LockedApply::Conflict(object_id) => return Ok(Err(object_id)),
                }
            }

            let (id, previous_ids) = {
                let mut state = self.lock_state();
                state.applied = true;
                state.closed = true;
                state.modified.clear();
                state.created.clear();
                (state.id, state.previous_ids.clone())
            };
            rt.close_ids(id, &previous_ids);
            let previous_global = rt.take_new_global_locked();
            let global_changed = previous_global.take_modified_locked();

            let changed = modified
                .iter()
                .filter(|object| !unchanged.contains(&object.object_id()))
                .cloned()
                .collect();
            Ok(Ok(Publication {
                id,
                global_changed,
                changed,
                merged,
                observers: rt.apply_observers.snapshot(),
            }))
        })?;

        let publication = match publication {
            Ok(publication) => publication,
            Err(object_id) => {
                self.log_conflict(object_id);
                return Ok(SnapshotApplyResult::Failure(self.clone()));
            }
        };

        notify_apply(&publication.observers, &publication.global_changed, self);
        notify_apply(&publication.observers, &publication.changed, self);

        with_runtime(|rt| {
            let pins = self.lock_state().take_pins();
            rt.release_pins(pins);
            rt.check_and_overwrite_unused_records_locked();
            for object in publication
                .global_changed
                .iter()
                .chain(&publication.changed)
                .chain(&publication.merged)
            {
                rt.process_for_unused_records_locked(object);
            }
        });

        debug!(
            target: "strata::snapshot",
            snapshot_id = publication.id,
            changed = publication.changed.len(),
            merged = publication.merged.len(),
            "Snapshot applied"
        );
        Ok(SnapshotApplyResult::Success)
    }

    pub(super) fn log_conflict(&self, object_id: ObjectId) {
        debug!(
            target: "strata::snapshot",
            snapshot_id = self.id(),
            object = %object_id,
            "Apply conflict"
        );
    }

    /// Dispose a root or nested mutable snapshot
    pub(super) fn dispose_mutable(&self) {
        let disposed_now = with_runtime(|rt| {
            let abandon = {
                let mut state = self.lock_state();
                if state.disposed {
                    return false;
                }
                state.disposed = true;
                if let Some(pin) = state.pin.take() {
                    rt.pins.release(pin);
                }
                state.active = state.active.saturating_sub(1);
                state.active == 0 && !state.applied
            };
            if abandon {
                self.abandon_locked(rt);
            }
            true
        });
        if disposed_now && self.placement() == Placement::Nested {
            self.deactivate();
        }
    }

    /// Discard every write made in this snapshot
    ///
    /// Records of modified and created objects carrying any of this
    /// snapshot's ids are retagged `INVALID_SNAPSHOT`, then the ids are
    /// closed. Objects created here keep their `PREEXISTING_SNAPSHOT` record.
    pub(crate) fn abandon_locked(&self, rt: &mut Runtime) {
        let (id, ids, previous_ids, modified, created, pins) = {
            let mut state = self.lock_state();
            if state.closed || state.applied {
                return;
            }
            state.closed = true;
            let modified = std::mem::take(&mut state.modified);
            let created = std::mem::take(&mut state.created);
            (
                state.id,
                state.previous_ids.set(state.id),
                state.previous_ids.clone(),
                modified,
                created,
                state.take_pins(),
            )
        };

        let mut invalidated = 0;
        for object in modified.values() {
            invalidated += object.chain().invalidate_locked(&ids);
        }
        for object in created.iter().filter_map(Weak::upgrade) {
            invalidated += object.chain().invalidate_locked(&ids);
        }
        rt.close_ids(id, &previous_ids);
        rt.release_pins(pins);

        debug!(
            target: "strata::snapshot",
            snapshot_id = id,
            objects = modified.len(),
            records = invalidated,
            "Snapshot abandoned"
        );
    }

    /// Report this nested snapshot as inactive to its parent, once
    pub(super) fn deactivate(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        let first = with_runtime(|_| {
            let mut state = self.lock_state();
            !std::mem::replace(&mut state.deactivated, true)
        });
        if first {
            parent.nested_deactivated();
        }
    }
}
