//! Record reclamation
//!
//! After each publication, objects touched by it are scanned for records
//! that no open snapshot can select any more. Objects still holding more than
//! one live record join a working set that is rescanned after every later
//! publication, until they drop back to a single record or are dropped.
//!
//! Reclaimed records stay linked; they are retagged `INVALID_SNAPSHOT` and
//! recycled by the write path, which bounds each chain's length by the
//! number of concurrently pinned snapshots.

use crate::object::StateObject;
use crate::runtime::Runtime;
use std::sync::Arc;
use tracing::trace;

impl Runtime {
    /// Rescan the working set against the current reclamation floor
    pub(crate) fn check_and_overwrite_unused_records_locked(&mut self) {
        if !self.options.reclaim_records {
            return;
        }
        let floor = self.reuse_floor();
        let before = self.extra_state_objects.len();
        self.extra_state_objects.retain(|_, object| match object.upgrade() {
            Some(object) => object.chain().overwrite_unused_locked(floor),
            None => false,
        });
        let after = self.extra_state_objects.len();
        if before != after {
            trace!(
                target: "strata::reclaim",
                floor,
                released = before - after,
                remaining = after,
                "Working set shrunk"
            );
        }
    }

    /// Reclaim one object's records; track it if several remain
    pub(crate) fn process_for_unused_records_locked(&mut self, object: &Arc<dyn StateObject>) {
        if !self.options.reclaim_records {
            return;
        }
        let floor = self.reuse_floor();
        if object.chain().overwrite_unused_locked(floor) {
            self.extra_state_objects
                .insert(object.object_id(), Arc::downgrade(object));
        }
    }
}
