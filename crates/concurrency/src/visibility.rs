//! Visibility rules for state records
//!
//! Every read and every apply-time conflict check is built on one rule: a
//! viewer sees the record with the largest id that is valid for it.
//!
//! A candidate id is valid for a viewer iff
//! - it is not `INVALID_SNAPSHOT`,
//! - it does not exceed the viewer's id, and
//! - it is not in the viewer's invalid set.

use crate::record::StateRecord;
use std::sync::Arc;
use strata_core::{SnapshotId, SnapshotIdSet, INVALID_SNAPSHOT};

/// Check whether a record tagged `candidate` is visible to `viewer`
#[inline]
pub fn valid(viewer: SnapshotId, candidate: SnapshotId, invalid: &SnapshotIdSet) -> bool {
    candidate != INVALID_SNAPSHOT && candidate <= viewer && !invalid.get(candidate)
}

/// Select the record visible to `viewer`: the largest valid id wins
///
/// Returns `None` when no record is valid (a stale read). Each record's id is
/// loaded once, so a concurrent retag cannot make the comparison inconsistent.
pub fn readable<T>(
    head: &Arc<StateRecord<T>>,
    viewer: SnapshotId,
    invalid: &SnapshotIdSet,
) -> Option<Arc<StateRecord<T>>> {
    let mut candidate: Option<(&Arc<StateRecord<T>>, SnapshotId)> = None;
    let mut current = Some(head);
    while let Some(record) = current {
        let id = record.snapshot_id();
        if valid(viewer, id, invalid) && candidate.map_or(true, |(_, best)| id > best) {
            candidate = Some((record, id));
        }
        current = record.next();
    }
    candidate.map(|(record, _)| Arc::clone(record))
}
