//! Transparent snapshots
//!
//! A transparent snapshot adds read and write observers on top of the
//! snapshot it wraps without creating a new view. Reads and writes go
//! straight to the target (the wrapped snapshot, or the live global snapshot
//! when nothing was entered), then its observers fire followed by the
//! target's.

use super::{Access, Placement, Snapshot};
use crate::current::thread_snapshot;
use crate::observer::{ReadObserver, WriteObserver};
use crate::runtime::global_snapshot;
use strata_core::{Result, SnapshotIdSet, INVALID_SNAPSHOT};

impl Snapshot {
    fn new_transparent(
        parent: Option<Snapshot>,
        read_observer: Option<ReadObserver>,
        write_observer: Option<WriteObserver>,
    ) -> Snapshot {
        let access = parent.as_ref().map_or(Access::Mutable, Snapshot::access);
        Snapshot::build(
            access,
            Placement::Transparent,
            parent,
            read_observer.into_iter().collect(),
            write_observer.into_iter().collect(),
            INVALID_SNAPSHOT,
            SnapshotIdSet::EMPTY,
            None,
        )
    }

    /// Snapshot a transparent snapshot reads and writes through
    ///
    /// Without a parent this is the global snapshot live at the time of the
    /// call, not the one current when the wrapper was created.
    pub(crate) fn target(&self) -> Snapshot {
        match self.parent() {
            Some(parent) => parent.clone(),
            None => global_snapshot(),
        }
    }
}

/// Run `f` with extra observers on the current snapshot
///
/// Reads inside `f` notify `read_observer`; first writes notify
/// `write_observer`. With neither observer given `f` simply runs.
pub fn observe<R>(
    read_observer: Option<ReadObserver>,
    write_observer: Option<WriteObserver>,
    f: impl FnOnce() -> R,
) -> Result<R> {
    if read_observer.is_none() && write_observer.is_none() {
        return Ok(f());
    }
    let snapshot = Snapshot::new_transparent(thread_snapshot(), read_observer, write_observer);
    let result = snapshot.enter(f);
    snapshot.dispose();
    result
}
