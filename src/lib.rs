//! Strata State - snapshot isolation for in-memory observable state
//!
//! Every read and write of a [`MutableState`] happens in a snapshot. Writes
//! made in a mutable snapshot stay private until it is applied; applying
//! publishes all of them atomically or fails on a conflicting concurrent
//! change that the state's policy cannot merge.
//!
//! # Quick Start
//!
//! ```ignore
//! use strata_state::{with_mutable_snapshot, MutableState};
//!
//! let from = MutableState::new(100);
//! let to = MutableState::new(0);
//!
//! with_mutable_snapshot(|| {
//!     from.update(|n| n - 30)?;
//!     to.update(|n| n + 30)
//! })?;
//! ```
//!
//! # Architecture
//!
//! - `strata-core`: ids, id sets, errors
//! - `strata-concurrency`: record chains, snapshots, apply, reclamation
//! - `strata-engine`: typed state, policies, configuration

pub use strata_concurrency::{
    current_snapshot, global_snapshot, notify_objects_initialized, observe,
    register_apply_observer, register_global_write_observer, send_apply_notifications,
    take_mutable_snapshot, take_snapshot, Access, ApplyObserver, MergedRecord, ObserverHandle,
    Placement, ReadObserver, RecordChain, RecordChainOps, RuntimeOptions, Snapshot,
    SnapshotApplyResult, SnapshotKind, SnapshotScope, StateObject, StateRecord, WritableRecord,
    WriteObserver,
};
pub use strata_core::{
    Error, ObjectId, Result, SnapshotId, SnapshotIdSet, INVALID_SNAPSHOT, PREEXISTING_SNAPSHOT,
};
pub use strata_engine::{
    with_mutable_snapshot, with_mutable_snapshot_retry, EngineMetrics, MergeWith, MutableState,
    MutationPolicy, NeverEqualPolicy, ReferentialEqualityPolicy, RetryConfig, StateConfig,
    StateEngine, StructuralEqualityPolicy,
};
