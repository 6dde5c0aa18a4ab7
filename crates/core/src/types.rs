//! Core identifier types for the snapshot engine
//!
//! This module defines the foundational identifiers:
//! - SnapshotId: Monotonic transaction identifier assigned to every snapshot
//! - ObjectId: Stable identity of one state object (one logical cell)
//!
//! Reserved snapshot ids:
//! - `INVALID_SNAPSHOT` (0): records tagged with it are never selected by any reader
//! - `PREEXISTING_SNAPSHOT` (1): records every snapshot may read
//! - `FIRST_SNAPSHOT` (2): id of the initial global snapshot

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a snapshot (transaction)
///
/// Snapshot ids are allocated from a single monotonically increasing counter
/// owned by the global runtime. A record tagged with a snapshot id is visible
/// to a viewer only if the id does not exceed the viewer's id and is not part
/// of the viewer's invalid set.
pub type SnapshotId = u64;

/// Sentinel id: permanently invalid or reclaimed record
pub const INVALID_SNAPSHOT: SnapshotId = 0;

/// Id used for the record every snapshot can read
///
/// Objects created inside a non-global snapshot carry an extra record tagged
/// with this id so that snapshots other than the creator can observe the
/// initial value.
pub const PREEXISTING_SNAPSHOT: SnapshotId = 1;

/// Id of the first global snapshot
pub const FIRST_SNAPSHOT: SnapshotId = PREEXISTING_SNAPSHOT + 1;

/// Check whether an id is one of the reserved values
#[inline]
pub fn is_reserved(id: SnapshotId) -> bool {
    id < FIRST_SNAPSHOT
}

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a state object
///
/// Used as the key of modified sets and of the reclamation working set.
/// Ids are process-unique and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate a fresh, process-unique object id
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value of this id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}
