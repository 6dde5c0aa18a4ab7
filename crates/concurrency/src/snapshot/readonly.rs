//! Read-only snapshots
//!
//! A root read-only snapshot owns an id and keeps it open until it and every
//! nested snapshot taken from it are disposed. A nested read-only snapshot of
//! a read-only snapshot shares its parent's id and invalid set; it only adds
//! a pin and observers.

use super::{Access, Placement, Snapshot};
use crate::observer::ReadObserver;
use crate::runtime::{with_runtime, Runtime};
use strata_core::{Result, SnapshotIdSet};
use tracing::debug;

impl Snapshot {
    pub(super) fn take_nested_of_readonly(&self, mut read_observers: Vec<ReadObserver>) -> Result<Snapshot> {
        read_observers.extend(self.read_observers().iter().cloned());
        let child = with_runtime(|rt| -> Result<Snapshot> {
            let (id, invalid) = {
                let state = self.lock_state();
                state.ensure_not_disposed()?;
                (state.id, state.invalid.clone())
            };
            let pin = rt.track_pinning(id, &invalid);
            let child = Snapshot::build(
                Access::ReadOnly,
                Placement::Nested,
                Some(self.clone()),
                read_observers,
                Vec::new(),
                id,
                invalid,
                Some(pin),
            );
            child.lock_state().owns_id = false;
            self.lock_state().active += 1;
            Ok(child)
        })?;

        debug!(
            target: "strata::snapshot",
            snapshot_id = child.id(),
            kind = ?child.kind(),
            "Snapshot taken"
        );
        Ok(child)
    }

    pub(super) fn dispose_readonly(&self) {
        let disposed_now = with_runtime(|rt| {
            let close = {
                let mut state = self.lock_state();
                if state.disposed {
                    return false;
                }
                state.disposed = true;
                if let Some(pin) = state.pin.take() {
                    rt.pins.release(pin);
                }
                state.active = state.active.saturating_sub(1);
                state.active == 0 && state.owns_id
            };
            if close {
                self.close_readonly_locked(rt);
            }
            true
        });
        if disposed_now && self.placement() == Placement::Nested {
            self.deactivate();
        }
    }

    pub(crate) fn close_readonly_locked(&self, rt: &mut Runtime) {
        let id = {
            let mut state = self.lock_state();
            if std::mem::replace(&mut state.closed, true) {
                return;
            }
            state.id
        };
        rt.close_ids(id, &SnapshotIdSet::EMPTY);
        debug!(target: "strata::snapshot", snapshot_id = id, "Read-only snapshot closed");
    }
}
