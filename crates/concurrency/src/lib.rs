//! Snapshot isolation runtime for strata state
//!
//! This crate implements multi-version snapshot isolation over in-memory
//! state objects:
//! - StateRecord / RecordChain: per-object version chains
//! - Snapshot: global, root, nested, read-only and transparent views
//! - Apply engine: optimistic, lock-free conflict merge followed by a short
//!   locked validate-and-publish step
//! - Pinning and reclamation: bounded chain growth
//! - Observers: read, write, apply and global-write callbacks
//!
//! State object types themselves (typed cells with mutation policies) live in
//! `strata-engine`; anything implementing [`StateObject`] can participate.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod apply;
pub mod current;
pub mod object;
pub mod observer;
mod pinning;
mod reclaim;
pub mod record;
pub mod runtime;
pub mod snapshot;
pub mod visibility;
pub mod write;

pub use current::{current_snapshot, thread_snapshot, SnapshotScope};
pub use object::{MergedRecord, StateObject};
pub use observer::{
    register_apply_observer, register_global_write_observer, ApplyObserver, ObserverHandle,
    ReadObserver, WriteObserver,
};
pub use record::{RecordChain, RecordChainOps, StateRecord};
pub use runtime::{
    configure_runtime, global_snapshot, lowest_pinned, open_snapshot_ids, pinned_count,
    reset_runtime_for_tests, runtime_options, tracked_object_count, RuntimeOptions,
};
pub use snapshot::{
    notify_objects_initialized, observe, send_apply_notifications, take_mutable_snapshot,
    take_snapshot, Access, Placement, Snapshot, SnapshotApplyResult, SnapshotKind,
};
pub use visibility::{readable, valid};
pub use write::{
    current_record, new_record_chain, read_record, register_created, writable_record, write_value,
    WritableRecord,
};
