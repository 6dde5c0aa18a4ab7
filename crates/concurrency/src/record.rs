//! State records and per-object record chains
//!
//! A `StateRecord` is one version of a state object's value, tagged with the
//! id of the snapshot that produced it. Records form a singly linked list,
//! newest first, whose head is owned by the object's `RecordChain`.
//!
//! ## Structure
//!
//! - `next` links are immutable once a record is created. New records are
//!   only ever prepended, so a reader holding the head can walk the chain
//!   without any lock.
//! - Records are never unlinked. Reclamation retags a record with
//!   `INVALID_SNAPSHOT`, which removes it from every reader's view, and the
//!   write path later recycles it for a new version.
//! - All structural edits (prepend, retag, recycle) happen while the caller
//!   holds the runtime lock. The value payload has its own `RwLock` so the
//!   single writer of a record can store into it after the runtime lock is
//!   released.
//! - A store re-checks the record's id under the value lock, and recycling
//!   retags under the same lock. A write that outlives its snapshot's claim
//!   on the record is dropped instead of landing in another version.

use crate::visibility::{readable, valid};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::{SnapshotId, SnapshotIdSet, INVALID_SNAPSHOT, PREEXISTING_SNAPSHOT};
use tracing::trace;

/// One version of a state object's value
pub struct StateRecord<T> {
    snapshot_id: AtomicU64,
    value: RwLock<T>,
    next: Option<Arc<StateRecord<T>>>,
}

impl<T> StateRecord<T> {
    pub(crate) fn new(snapshot_id: SnapshotId, value: T, next: Option<Arc<StateRecord<T>>>) -> Self {
        Self {
            snapshot_id: AtomicU64::new(snapshot_id),
            value: RwLock::new(value),
            next,
        }
    }

    /// Id of the snapshot that produced this record
    ///
    /// `INVALID_SNAPSHOT` means the record is reclaimed or was abandoned.
    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_snapshot_id(&self, id: SnapshotId) {
        self.snapshot_id.store(id, Ordering::Release);
    }

    /// Next (older) record in the chain
    pub fn next(&self) -> Option<&Arc<StateRecord<T>>> {
        self.next.as_ref()
    }

    /// Borrow the value
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.value.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.value.write()
    }

    /// Store `value` if the record still carries `expected` and `accepts`
    ///
    /// Both checks run under the value lock. On rejection the value is
    /// handed back.
    pub(crate) fn store_as(&self, expected: SnapshotId, value: T, accepts: impl FnOnce() -> bool) -> Result<(), T> {
        let mut guard = self.value.write();
        if self.snapshot_id() != expected || !accepts() {
            return Err(value);
        }
        *guard = value;
        Ok(())
    }
}

impl<T: fmt::Debug> fmt::Debug for StateRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRecord")
            .field("snapshot_id", &self.snapshot_id())
            .field("value", &*self.read())
            .finish()
    }
}

/// Head of a state object's record chain
pub struct RecordChain<T> {
    head: RwLock<Arc<StateRecord<T>>>,
}

impl<T> RecordChain<T> {
    /// Create a chain holding one record tagged `snapshot_id`
    pub fn new(snapshot_id: SnapshotId, value: T) -> Self {
        Self {
            head: RwLock::new(Arc::new(StateRecord::new(snapshot_id, value, None))),
        }
    }

    /// Current head of the chain (newest record)
    pub fn head(&self) -> Arc<StateRecord<T>> {
        Arc::clone(&self.head.read())
    }

    /// Number of records in the chain, including reclaimed ones
    pub fn len(&self) -> usize {
        self.ids().len()
    }

    /// Always false: a chain holds at least one record
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Snapshot ids of every record, newest first
    pub fn ids(&self) -> Vec<SnapshotId> {
        let head = self.head();
        let mut ids = Vec::new();
        let mut current = Some(&head);
        while let Some(record) = current {
            ids.push(record.snapshot_id());
            current = record.next();
        }
        ids
    }

    /// Record visible to `viewer` given its invalid set
    pub fn readable(&self, viewer: SnapshotId, invalid: &SnapshotIdSet) -> Option<Arc<StateRecord<T>>> {
        readable(&self.head(), viewer, invalid)
    }

    /// Record tagged exactly `id`
    ///
    /// There is at most one live record per id, so this is unambiguous for
    /// any id other than `INVALID_SNAPSHOT`.
    pub fn find(&self, id: SnapshotId) -> Option<Arc<StateRecord<T>>> {
        let head = self.head();
        let mut current = Some(&head);
        while let Some(record) = current {
            if record.snapshot_id() == id {
                return Some(Arc::clone(record));
            }
            current = record.next();
        }
        None
    }

    fn prepend_locked(&self, id: SnapshotId, value: T) -> Arc<StateRecord<T>> {
        let mut head = self.head.write();
        let record = Arc::new(StateRecord::new(id, value, Some(Arc::clone(&head))));
        *head = Arc::clone(&record);
        record
    }

    /// Find a record that no open snapshot can select
    ///
    /// Returns a reclaimed record if there is one. Otherwise, if two records
    /// are both below `floor` (the lowest pinned id), every snapshot sees the
    /// younger one, so the older is returned.
    fn used_locked(&self, floor: SnapshotId) -> Option<Arc<StateRecord<T>>> {
        let reuse_limit = floor.saturating_sub(1);
        let head = self.head();
        let mut valid_record: Option<(&Arc<StateRecord<T>>, SnapshotId)> = None;
        let mut current = Some(&head);
        while let Some(record) = current {
            let id = record.snapshot_id();
            if id == INVALID_SNAPSHOT {
                return Some(Arc::clone(record));
            }
            if valid(reuse_limit, id, &SnapshotIdSet::EMPTY) {
                match valid_record {
                    None => valid_record = Some((record, id)),
                    Some((other, other_id)) => {
                        let older = if id < other_id { record } else { other };
                        return Some(Arc::clone(older));
                    }
                }
            }
            current = record.next();
        }
        None
    }

    /// Obtain a record tagged `id` holding `value`
    ///
    /// Recycles an unreachable record when possible, otherwise prepends a new
    /// one. Caller holds the runtime lock.
    pub(crate) fn new_record_locked(&self, id: SnapshotId, value: T, floor: SnapshotId) -> Arc<StateRecord<T>> {
        match self.used_locked(floor) {
            Some(record) => {
                trace!(
                    target: "strata::reclaim",
                    from = record.snapshot_id(),
                    to = id,
                    "Recycling record"
                );
                let mut guard = record.write();
                *guard = value;
                record.set_snapshot_id(id);
                drop(guard);
                record
            }
            None => self.prepend_locked(id, value),
        }
    }
}

impl<T: Clone> RecordChain<T> {
    /// Create a chain for an object created inside a snapshot
    ///
    /// The object gets a record tagged with the creating snapshot's id and a
    /// second record tagged `PREEXISTING_SNAPSHOT`, so that every other
    /// snapshot can read the initial value too.
    pub fn with_preexisting(snapshot_id: SnapshotId, value: T) -> Self {
        let preexisting = Arc::new(StateRecord::new(PREEXISTING_SNAPSHOT, value.clone(), None));
        Self {
            head: RwLock::new(Arc::new(StateRecord::new(snapshot_id, value, Some(preexisting)))),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RecordChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.head();
        let mut list = f.debug_list();
        let mut current = Some(&head);
        while let Some(record) = current {
            list.entry(record);
            current = record.next();
        }
        list.finish()
    }
}

/// Type-erased operations on a record chain
///
/// The snapshot engine works on heterogeneous objects (`dyn StateObject`), so
/// every chain operation it needs during apply, abandon and reclamation goes
/// through this trait. Methods ending in `_locked` require the runtime lock.
pub trait RecordChainOps: Send + Sync {
    /// Id of the record visible to `viewer`, if any
    fn readable_id(&self, viewer: SnapshotId, invalid: &SnapshotIdSet) -> Option<SnapshotId>;

    /// Number of records, including reclaimed ones
    fn record_count(&self) -> usize;

    /// Snapshot ids of every record, newest first
    fn record_ids(&self) -> Vec<SnapshotId>;

    /// Check whether `value` has this chain's value type
    fn accepts_value(&self, value: &(dyn Any + Send)) -> bool;

    /// Add a record tagged `target` holding a copy of the record tagged `source`
    ///
    /// Returns false if no record carries `source`.
    fn copy_record_locked(&self, source: SnapshotId, target: SnapshotId, floor: SnapshotId) -> bool;

    /// Add a record tagged `target` holding `value`
    ///
    /// Returns false if the value has the wrong type.
    fn install_value_locked(&self, value: Box<dyn Any + Send>, target: SnapshotId, floor: SnapshotId) -> bool;

    /// Retag every record whose id is in `ids` as `INVALID_SNAPSHOT`
    ///
    /// Returns the number of records invalidated.
    fn invalidate_locked(&self, ids: &SnapshotIdSet) -> usize;

    /// Reclaim records superseded below `floor`
    ///
    /// Among records below `floor` only the youngest can still be selected by
    /// any snapshot. The others are retagged `INVALID_SNAPSHOT` and given the
    /// value of the youngest record at or above `floor` (or the youngest
    /// record overall) so a stale reference still reads something current.
    ///
    /// Returns true if more than one record is still retained, meaning the
    /// chain should be scanned again after later publications.
    fn overwrite_unused_locked(&self, floor: SnapshotId) -> bool;
}

impl<T> RecordChainOps for RecordChain<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn readable_id(&self, viewer: SnapshotId, invalid: &SnapshotIdSet) -> Option<SnapshotId> {
        self.readable(viewer, invalid).map(|record| record.snapshot_id())
    }

    fn record_count(&self) -> usize {
        self.len()
    }

    fn record_ids(&self) -> Vec<SnapshotId> {
        self.ids()
    }

    fn accepts_value(&self, value: &(dyn Any + Send)) -> bool {
        value.is::<T>()
    }

    fn copy_record_locked(&self, source: SnapshotId, target: SnapshotId, floor: SnapshotId) -> bool {
        let Some(record) = self.find(source) else {
            return false;
        };
        let value = record.read().clone();
        self.new_record_locked(target, value, floor);
        true
    }

    fn install_value_locked(&self, value: Box<dyn Any + Send>, target: SnapshotId, floor: SnapshotId) -> bool {
        match value.downcast::<T>() {
            Ok(value) => {
                self.new_record_locked(target, *value, floor);
                true
            }
            Err(_) => false,
        }
    }

    fn invalidate_locked(&self, ids: &SnapshotIdSet) -> usize {
        let head = self.head();
        let mut count = 0;
        let mut current = Some(&head);
        while let Some(record) = current {
            let id = record.snapshot_id();
            if id != INVALID_SNAPSHOT && ids.get(id) {
                record.set_snapshot_id(INVALID_SNAPSHOT);
                count += 1;
            }
            current = record.next();
        }
        count
    }

    fn overwrite_unused_locked(&self, floor: SnapshotId) -> bool {
        let head = self.head();
        let mut valid_record: Option<(&Arc<StateRecord<T>>, SnapshotId)> = None;
        let mut overwrite_value: Option<T> = None;
        let mut retained = 0usize;

        let mut current = Some(&head);
        while let Some(record) = current {
            let id = record.snapshot_id();
            if id != INVALID_SNAPSHOT {
                if id < floor {
                    match valid_record {
                        None => {
                            valid_record = Some((record, id));
                            retained += 1;
                        }
                        Some((kept, kept_id)) => {
                            let victim = if id < kept_id {
                                record
                            } else {
                                valid_record = Some((record, id));
                                kept
                            };
                            let value = overwrite_value
                                .get_or_insert_with(|| youngest_or_at_least(&head, floor).read().clone())
                                .clone();
                            let mut guard = victim.write();
                            victim.set_snapshot_id(INVALID_SNAPSHOT);
                            *guard = value;
                        }
                    }
                } else {
                    retained += 1;
                }
            }
            current = record.next();
        }

        retained > 1
    }
}

/// First record at or above `floor`, or the youngest record in the chain
fn youngest_or_at_least<T>(head: &Arc<StateRecord<T>>, floor: SnapshotId) -> Arc<StateRecord<T>> {
    let mut youngest = head;
    let mut youngest_id = head.snapshot_id();
    let mut current = Some(head);
    while let Some(record) = current {
        let id = record.snapshot_id();
        if id >= floor {
            return Arc::clone(record);
        }
        if id > youngest_id {
            youngest = record;
            youngest_id = id;
        }
        current = record.next();
    }
    Arc::clone(youngest)
}
