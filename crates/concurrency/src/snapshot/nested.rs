//! Nested snapshots of mutable snapshots
//!
//! Taking a nested snapshot advances the parent: the parent's old id becomes
//! a previous id and it continues under a fresh one, so the child sees
//! exactly the parent's writes so far and the parent never sees the child's
//! writes until the child applies.
//!
//! Applying a nested mutable snapshot folds its writes into the parent
//! instead of publishing them. The child's ids join the parent's previous
//! ids, making its records the parent's own, and the parent takes over the
//! child's pins. No apply observers fire; they fire when the root applies.

use super::{Access, Placement, Snapshot, SnapshotApplyResult};
use crate::apply::{apply_locked, optimistic_merges, ApplyView, LockedApply, Optimistic};
use crate::observer::{ReadObserver, WriteObserver};
use crate::runtime::with_runtime;
use strata_core::{Error, Result};
use tracing::debug;

impl Snapshot {
    pub(super) fn take_nested_of_mutable(
        &self,
        access: Access,
        mut read_observers: Vec<ReadObserver>,
        mut write_observers: Vec<WriteObserver>,
    ) -> Result<Snapshot> {
        read_observers.extend(self.read_observers().iter().cloned());
        if access == Access::Mutable {
            write_observers.extend(self.write_observers().iter().cloned());
        } else {
            write_observers.clear();
        }

        let child = with_runtime(|rt| -> Result<Snapshot> {
            let (parent_id, parent_invalid) = {
                let state = self.lock_state();
                state.ensure_open()?;
                (state.id, state.invalid.clone())
            };

            let child_id = rt.open_new_id();
            let child_invalid = parent_invalid.add_range(parent_id + 1, child_id);
            if access == Access::Mutable {
                let mut state = self.lock_state();
                state.invalid = state.invalid.set(child_id);
            }
            let pin = rt.track_pinning(child_id, &child_invalid);
            let child = Snapshot::build(
                access,
                Placement::Nested,
                Some(self.clone()),
                read_observers,
                write_observers,
                child_id,
                child_invalid,
                Some(pin),
            );

            self.advance_locked(rt);
            self.lock_state().active += 1;
            Ok(child)
        })?;

        debug!(
            target: "strata::snapshot",
            snapshot_id = child.id(),
            parent_id = self.id(),
            kind = ?child.kind(),
            "Snapshot taken"
        );
        Ok(child)
    }

    pub(super) fn apply_nested(&self) -> Result<SnapshotApplyResult> {
        let parent = match self.parent() {
            Some(parent) => parent.clone(),
            None => {
                return Err(Error::Unsupported(
                    "nested snapshot without a parent".to_string(),
                ))
            }
        };

        let (modified, view) = {
            let state = self.lock_state();
            state.ensure_open()?;
            (state.modified_sorted(), ApplyView::of(&state))
        };
        if parent.lock_state().ensure_open().is_err() {
            return Ok(SnapshotApplyResult::Failure(self.clone()));
        }

        let mut optimistic = None;
        if !modified.is_empty() && with_runtime(|rt| rt.options.optimistic_merge) {
            let (parent_id, parent_invalid) = parent.read_view();
            match optimistic_merges(&view, &modified, parent_id, &parent_invalid) {
                Optimistic::Merges(merges) => optimistic = Some(merges),
                Optimistic::Conflict(object_id) => {
                    self.log_conflict(object_id);
                    return Ok(SnapshotApplyResult::Failure(self.clone()));
                }
            }
        }

        let outcome = with_runtime(|rt| -> Result<Option<usize>> {
            self.lock_state().ensure_open()?;
            let (parent_id, parent_invalid) = {
                let state = parent.lock_state();
                if state.ensure_open().is_err() {
                    return Ok(None);
                }
                (state.id, state.invalid.clone())
            };

            let mut unchanged = Vec::new();
            if !modified.is_empty() {
                match apply_locked(rt, self, &modified, optimistic, parent_id, &parent_invalid) {
                    LockedApply::Applied { unchanged: skipped, .. } => unchanged = skipped,
                    LockedApply::Conflict(object_id) => {
                        self.log_conflict(object_id);
                        return Ok(None);
                    }
                }
            }

            let (id, previous_ids, pins, created) = {
                let mut state = self.lock_state();
                state.applied = true;
                state.closed = true;
                state.modified.clear();
                (
                    state.id,
                    state.previous_ids.clone(),
                    state.take_pins(),
                    std::mem::take(&mut state.created),
                )
            };

            if parent.id() < id {
                parent.advance_locked(rt);
            }

            let folded = {
                let mut state = parent.lock_state();
                let mut folded = 0;
                for object in &modified {
                    let object_id = object.object_id();
                    if !unchanged.contains(&object_id) {
                        state.modified.entry(object_id).or_insert_with(|| {
                            folded += 1;
                            object.clone()
                        });
                    }
                }
                state.created.extend(created);
                state.invalid = state.invalid.clear(id).and_not(&previous_ids);
                state.previous_ids = state.previous_ids.set(id).or(&previous_ids);
                state.previous_pins.extend(pins);
                folded
            };
            Ok(Some(folded))
        })?;

        match outcome {
            Some(folded) => {
                debug!(
                    target: "strata::snapshot",
                    snapshot_id = self.id(),
                    parent_id = parent.id(),
                    folded,
                    "Nested snapshot applied"
                );
                self.deactivate();
                Ok(SnapshotApplyResult::Success)
            }
            None => Ok(SnapshotApplyResult::Failure(self.clone())),
        }
    }
}
