//! Core types for Strata state snapshots
//!
//! This crate defines the foundational types used throughout the system:
//! - SnapshotId: Monotonic transaction identifier, with reserved sentinels
//! - ObjectId: Stable identity of one state object
//! - SnapshotIdSet: Immutable set of snapshot ids (invalid sets, open sets)
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id_set;
pub mod types;

pub use error::{Error, Result};
pub use id_set::SnapshotIdSet;
pub use types::{
    is_reserved, ObjectId, SnapshotId, FIRST_SNAPSHOT, INVALID_SNAPSHOT, PREEXISTING_SNAPSHOT,
};
