//! Typed state holder
//!
//! `MutableState<T>` is the value-holder most callers use. Reads go through
//! the thread's current snapshot and notify its read observers; writes take
//! the snapshot write path and are skipped when the new value is equivalent
//! under the state's policy.
//!
//! Conflicts on apply are resolved through the policy: if the concurrently
//! published value is equivalent to this snapshot's write, the published one
//! wins silently; otherwise the policy's `merge` decides.

use crate::policy::{MutationPolicy, StructuralEqualityPolicy};
use std::fmt;
use std::sync::Arc;
use strata_concurrency::{
    current_record, new_record_chain, read_record, register_created, write_value, MergedRecord,
    RecordChain, RecordChainOps, StateObject,
};
use strata_core::{ObjectId, Result, SnapshotId};

struct StateCell<T, P> {
    id: ObjectId,
    chain: RecordChain<T>,
    policy: P,
}

impl<T, P> StateObject for StateCell<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: MutationPolicy<T>,
{
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn chain(&self) -> &dyn RecordChainOps {
        &self.chain
    }

    fn merge_records(&self, previous: SnapshotId, current: SnapshotId, applied: SnapshotId) -> Option<MergedRecord> {
        let current = self.chain.find(current)?;
        let applied = self.chain.find(applied)?;
        let (current, applied) = (current.read(), applied.read());
        if self.policy.equivalent(&current, &applied) {
            return Some(MergedRecord::Current);
        }
        let previous = self.chain.find(previous)?;
        let merged = self.policy.merge(&previous.read(), &current, &applied)?;
        Some(MergedRecord::Value(Box::new(merged)))
    }
}

/// Observable mutable value
///
/// Cloning the handle shares the underlying state.
///
/// # Example
///
/// ```ignore
/// let count = MutableState::new(0);
/// with_mutable_snapshot(|| count.update(|n| n + 1))?;
/// assert_eq!(count.get()?, 1);
/// ```
pub struct MutableState<T, P = StructuralEqualityPolicy> {
    cell: Arc<StateCell<T, P>>,
}

impl<T> MutableState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a state compared with `==`
    pub fn new(value: T) -> Self {
        Self::with_policy(value, StructuralEqualityPolicy)
    }
}

impl<T, P> MutableState<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: MutationPolicy<T>,
{
    /// Create a state with an explicit mutation policy
    ///
    /// Created inside a snapshot, the initial value is readable by every
    /// snapshot, but later writes in the creating snapshot are only tracked
    /// after `notify_objects_initialized`.
    pub fn with_policy(value: T, policy: P) -> Self {
        let cell = Arc::new(StateCell {
            id: ObjectId::next(),
            chain: new_record_chain(value),
            policy,
        });
        let object: Arc<dyn StateObject> = cell.clone();
        register_created(&object);
        Self { cell }
    }

    /// Identity of the underlying state object
    pub fn id(&self) -> ObjectId {
        self.cell.id
    }

    /// The state as a type-erased object
    pub fn object(&self) -> Arc<dyn StateObject> {
        self.cell.clone()
    }

    /// Read the value in the current snapshot
    pub fn get(&self) -> Result<T> {
        self.with(T::clone)
    }

    /// Borrow the value in the current snapshot
    ///
    /// `f` must not write this state.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let record = read_record(self.cell.as_ref(), &self.cell.chain)?;
        let value = record.read();
        Ok(f(&value))
    }

    /// Write the value in the current snapshot
    ///
    /// Skipped when `value` is equivalent to the current value.
    pub fn set(&self, value: T) -> Result<()> {
        let unchanged = {
            let current = current_record(self.cell.as_ref(), &self.cell.chain)?;
            let current = current.read();
            self.cell.policy.equivalent(&current, &value)
        };
        if unchanged {
            return Ok(());
        }
        write_value(&self.object(), &self.cell.chain, value)
    }

    /// Replace the value with `f(old)`
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let next = self.with(f)?;
        self.set(next)
    }

    /// Number of records in the state's chain, including reclaimed ones
    pub fn record_count(&self) -> usize {
        self.cell.chain.len()
    }
}

impl<T, P> Clone for MutableState<T, P> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T, P> fmt::Debug for MutableState<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableState")
            .field("id", &self.cell.id)
            .field("records", &self.cell.chain.len())
            .finish()
    }
}
