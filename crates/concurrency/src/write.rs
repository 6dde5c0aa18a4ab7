//! Read and write paths for typed state objects
//!
//! ## Write Path
//!
//! ```text
//! 1. Reject read-only snapshots; transparent snapshots delegate
//! 2. Fast path: the readable record already carries this snapshot's id
//! 3. Lock runtime, re-resolve the global snapshot if needed
//! 4. Copy the readable record into a record tagged with the snapshot's id
//! 5. Mark the object modified; remember whether this was the first write
//! 6. Unlock, notify write observers on first write
//! ```
//!
//! The caller then stores into the returned `WritableRecord`. The store is
//! checked under the record's value lock: it lands only if the record still
//! carries the id it was obtained under and the owning snapshot still writes
//! under that id. Otherwise the snapshot was abandoned, applied or advanced
//! in between, the record may be visible to others or recycled, and the
//! value is handed back. `write_value` retries such a store from step 1.

use crate::current::{current_snapshot, thread_snapshot};
use crate::object::StateObject;
use crate::observer::{notify_each, WriteObserver};
use crate::record::{RecordChain, StateRecord};
use crate::runtime::{global_snapshot, with_runtime};
use crate::snapshot::{Placement, Snapshot};
use parking_lot::RwLockReadGuard;
use std::sync::Arc;
use strata_core::{Error, Result, SnapshotId};
use tracing::trace;

/// A record a snapshot may write, bound to the id it was obtained under
pub struct WritableRecord<T> {
    record: Arc<StateRecord<T>>,
    snapshot_id: SnapshotId,
    owner: Snapshot,
}

impl<T> WritableRecord<T> {
    fn new(record: Arc<StateRecord<T>>, snapshot_id: SnapshotId, owner: Snapshot) -> Self {
        Self {
            record,
            snapshot_id,
            owner,
        }
    }

    /// Id the record was obtained under
    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot_id
    }

    /// Borrow the current value
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.record.read()
    }

    /// Store `value` unless the snapshot lost this record in the meantime
    ///
    /// Returns the value back if the record was retagged or the owning
    /// snapshot was disposed, applied, replaced or advanced.
    pub fn store(&self, value: T) -> std::result::Result<(), T> {
        let id = self.snapshot_id;
        self.record.store_as(id, value, || self.owner.writes_land_as(id))
    }
}

impl Snapshot {
    /// Record of `chain` visible to this snapshot
    ///
    /// If nothing is visible (the view is stale) the lookup is retried once
    /// against a fresh view: the thread's current snapshot or the live global.
    pub fn readable_record<T>(&self, object: &dyn StateObject, chain: &RecordChain<T>) -> Result<Arc<StateRecord<T>>> {
        let (id, invalid) = self.read_view();
        if let Some(record) = chain.readable(id, &invalid) {
            return Ok(record);
        }
        trace!(
            target: "strata::snapshot",
            snapshot_id = id,
            object = %object.object_id(),
            "Stale read, retrying against a fresh view"
        );
        with_runtime(|rt| {
            let fresh = thread_snapshot().unwrap_or_else(|| rt.global.clone());
            let (id, invalid) = fresh.read_view();
            chain.readable(id, &invalid).ok_or(Error::NoReadableRecord {
                object_id: object.object_id(),
                snapshot_id: id,
            })
        })
    }

    /// Record of `chain` this snapshot may write in place
    ///
    /// Creates the record on first write, marks the object modified and
    /// notifies write observers.
    pub fn writable_record<T>(&self, object: &Arc<dyn StateObject>, chain: &RecordChain<T>) -> Result<WritableRecord<T>>
    where
        T: Clone,
    {
        let (record, first_write) = self.locate_writable(object, chain)?;
        if let Some(observers) = first_write {
            notify_each(&observers, object.as_ref());
        }
        Ok(record)
    }

    /// Writable record plus the observers to notify if this was a first write
    #[allow(clippy::type_complexity)]
    fn locate_writable<T: Clone>(
        &self,
        object: &Arc<dyn StateObject>,
        chain: &RecordChain<T>,
    ) -> Result<(WritableRecord<T>, Option<Vec<WriteObserver>>)> {
        if self.is_read_only() {
            return Err(Error::ReadOnlyWrite {
                snapshot_id: self.id(),
            });
        }
        if self.placement() == Placement::Transparent {
            let (record, first_write) = self.target().locate_writable(object, chain)?;
            let first_write = first_write.map(|target_observers| {
                let mut observers = self.write_observers().to_vec();
                observers.extend(target_observers);
                observers
            });
            return Ok((record, first_write));
        }

        let (id, invalid, retired) = {
            let state = self.lock_state();
            state.ensure_open()?;
            (state.id, state.invalid.clone(), state.closed)
        };
        // A replaced global must not write its published records in place
        if !retired {
            if let Some(record) = chain.readable(id, &invalid) {
                if record.snapshot_id() == id {
                    return Ok((WritableRecord::new(record, id, self.clone()), None));
                }
            }
        }

        with_runtime(|rt| {
            let target = if self.placement() == Placement::Global {
                rt.global.clone()
            } else {
                self.clone()
            };
            let (id, invalid) = {
                let state = target.lock_state();
                state.ensure_open()?;
                (state.id, state.invalid.clone())
            };
            let readable = chain.readable(id, &invalid).ok_or(Error::NoReadableRecord {
                object_id: object.object_id(),
                snapshot_id: id,
            })?;
            if readable.snapshot_id() == id {
                return Ok((WritableRecord::new(readable, id, target), None));
            }

            let value = readable.read().clone();
            let record = chain.new_record_locked(id, value, rt.reuse_floor());
            let first_write = target
                .lock_state()
                .modified
                .insert(object.object_id(), Arc::clone(object))
                .is_none();

            let observers = first_write.then(|| {
                let mut observers = target.write_observers().to_vec();
                if target.placement() == Placement::Global {
                    observers.extend(rt.global_write_observers.snapshot());
                }
                observers
            });
            Ok((WritableRecord::new(record, id, target), observers))
        })
    }
}

/// Read `chain` through the current snapshot, notifying read observers
pub fn read_record<T>(object: &dyn StateObject, chain: &RecordChain<T>) -> Result<Arc<StateRecord<T>>> {
    let snapshot = current_snapshot();
    snapshot.notify_read(object);
    snapshot.readable_record(object, chain)
}

/// Read `chain` through the current snapshot without notifying observers
pub fn current_record<T>(object: &dyn StateObject, chain: &RecordChain<T>) -> Result<Arc<StateRecord<T>>> {
    current_snapshot().readable_record(object, chain)
}

/// Writable record of `chain` in the current snapshot
pub fn writable_record<T: Clone>(object: &Arc<dyn StateObject>, chain: &RecordChain<T>) -> Result<WritableRecord<T>> {
    current_snapshot().writable_record(object, chain)
}

/// Write `value` to `chain` in the current snapshot
///
/// A store rejected by a concurrent snapshot transition is retried against
/// a freshly resolved record. A disposed or applied snapshot surfaces as an
/// error on the retry.
pub fn write_value<T: Clone>(object: &Arc<dyn StateObject>, chain: &RecordChain<T>, value: T) -> Result<()> {
    let mut value = value;
    loop {
        let record = writable_record(object, chain)?;
        match record.store(value) {
            Ok(()) => return Ok(()),
            Err(rejected) => {
                trace!(
                    target: "strata::snapshot",
                    snapshot_id = record.snapshot_id(),
                    object = %object.object_id(),
                    "Store rejected, resolving the record again"
                );
                value = rejected;
            }
        }
    }
}

/// Record chain for an object created now
///
/// Inside a snapshot the chain gets a record under the snapshot's id plus a
/// `PREEXISTING_SNAPSHOT` record so other snapshots can read the initial
/// value. Outside any snapshot the single record carries the global id.
pub fn new_record_chain<T: Clone>(value: T) -> RecordChain<T> {
    match thread_snapshot() {
        Some(snapshot) => RecordChain::with_preexisting(snapshot.id(), value),
        None => RecordChain::new(global_snapshot().id(), value),
    }
}

/// Tell the current snapshot an object was created in it
///
/// Abandoning the snapshot then also discards writes to the new object.
pub fn register_created(object: &Arc<dyn StateObject>) {
    if let Some(snapshot) = thread_snapshot() {
        snapshot.record_created(object);
    }
}
