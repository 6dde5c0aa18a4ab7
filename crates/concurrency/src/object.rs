//! The state object contract
//!
//! A state object is one logical mutable cell. The snapshot engine only needs
//! three things from it: a stable identity, its record chain, and a way to
//! resolve a conflicting apply.

use crate::record::RecordChainOps;
use std::any::Any;
use std::fmt;
use strata_core::{ObjectId, SnapshotId};

/// Outcome of a conflict merge
///
/// The variants name which record's value should become the newly published
/// one. `Value` carries a freshly computed value whose type must match the
/// object's record type.
pub enum MergedRecord {
    /// Keep the value the applying snapshot started from
    Previous,
    /// Keep the value published concurrently; drop this snapshot's write
    Current,
    /// Keep this snapshot's write unchanged
    Applied,
    /// Publish a merged value
    Value(Box<dyn Any + Send>),
}

impl fmt::Debug for MergedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergedRecord::Previous => f.write_str("Previous"),
            MergedRecord::Current => f.write_str("Current"),
            MergedRecord::Applied => f.write_str("Applied"),
            MergedRecord::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// A mutable cell participating in the snapshot system
///
/// # Merge Purity
///
/// `merge_records` may be invoked twice for the same apply: once
/// optimistically outside the runtime lock and once under it. Implementations
/// must be pure and idempotent, must not read or write other state objects,
/// and must not take snapshots. The ids passed in can be resolved with
/// [`RecordChain::find`](crate::RecordChain::find).
pub trait StateObject: Send + Sync {
    /// Stable identity of this object
    fn object_id(&self) -> ObjectId;

    /// Type-erased access to the record chain
    fn chain(&self) -> &dyn RecordChainOps;

    /// Resolve a conflict between concurrent writes
    ///
    /// - `previous`: id of the record the applying snapshot started from
    /// - `current`: id of the record published since
    /// - `applied`: id of the applying snapshot's own record
    ///
    /// Returns `None` if the writes cannot be reconciled, which fails the
    /// whole apply. The default treats every concurrent change as a conflict.
    fn merge_records(
        &self,
        previous: SnapshotId,
        current: SnapshotId,
        applied: SnapshotId,
    ) -> Option<MergedRecord> {
        let _ = (previous, current, applied);
        None
    }

    /// Number of records in this object's chain
    fn record_count(&self) -> usize {
        self.chain().record_count()
    }
}

impl fmt::Debug for dyn StateObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateObject({})", self.object_id())
    }
}
