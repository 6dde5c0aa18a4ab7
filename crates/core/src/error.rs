//! Error types for the snapshot engine
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! A merge conflict during apply is not an error from the engine's point of
//! view: `apply()` reports it as a failed apply result. `ApplyConflict` exists
//! for callers that want to turn that result into an error with `?`.

use crate::types::{ObjectId, SnapshotId};
use thiserror::Error;

/// Result type alias for snapshot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the snapshot engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Attempted to write through a read-only snapshot
    #[error("Cannot write in read-only snapshot {snapshot_id}")]
    ReadOnlyWrite {
        /// Id of the read-only snapshot
        snapshot_id: SnapshotId,
    },

    /// Snapshot used after dispose
    #[error("Snapshot {snapshot_id} is disposed")]
    Disposed {
        /// Id of the disposed snapshot
        snapshot_id: SnapshotId,
    },

    /// Snapshot written to or applied after a successful apply
    #[error("Snapshot {snapshot_id} has already been applied")]
    AlreadyApplied {
        /// Id of the applied snapshot
        snapshot_id: SnapshotId,
    },

    /// No record of the object is visible to the snapshot
    ///
    /// Raised only after a retry against a fresh snapshot also failed, which
    /// indicates the object was created in a snapshot that never applied.
    #[error("No readable record of {object_id} for snapshot {snapshot_id}")]
    NoReadableRecord {
        /// Object being read
        object_id: ObjectId,
        /// Snapshot performing the read
        snapshot_id: SnapshotId,
    },

    /// Apply failed because a concurrent change could not be merged
    #[error("Snapshot {snapshot_id} conflicted with a concurrent apply")]
    ApplyConflict {
        /// Id of the snapshot that failed to apply
        snapshot_id: SnapshotId,
    },

    /// Operation not supported by this kind of snapshot
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if retrying the whole unit of work may succeed
    ///
    /// Only apply conflicts are transient. Every other variant signals
    /// misuse or a structural problem that a retry would repeat.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ApplyConflict { .. })
    }

    /// Check if this error reports misuse of a snapshot handle
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Error::ReadOnlyWrite { .. }
                | Error::Disposed { .. }
                | Error::AlreadyApplied { .. }
                | Error::Unsupported(_)
        )
    }
}
