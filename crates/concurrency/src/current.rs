//! Thread-local current snapshot
//!
//! Each thread has at most one installed snapshot. Installation is strictly
//! stack scoped: `install` returns a guard that restores the previously
//! installed snapshot when dropped, including during unwinding.

use crate::runtime::global_snapshot;
use crate::snapshot::Snapshot;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static CURRENT: RefCell<Option<Snapshot>> = const { RefCell::new(None) };
}

/// Snapshot installed on this thread, if any
pub fn thread_snapshot() -> Option<Snapshot> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Snapshot reads and writes on this thread go through
///
/// Falls back to the global snapshot when nothing is installed.
pub fn current_snapshot() -> Snapshot {
    thread_snapshot().unwrap_or_else(global_snapshot)
}

fn replace_current(snapshot: Option<Snapshot>) -> Option<Snapshot> {
    CURRENT.with(|current| current.replace(snapshot))
}

/// Guard restoring the previously installed snapshot on drop
///
/// Not `Send`: the guard must be dropped on the thread that created it.
#[must_use = "the snapshot is uninstalled when the scope is dropped"]
pub struct SnapshotScope {
    previous: Option<Snapshot>,
    _not_send: PhantomData<*const ()>,
}

impl SnapshotScope {
    pub(crate) fn install(snapshot: Snapshot) -> Self {
        Self {
            previous: replace_current(Some(snapshot)),
            _not_send: PhantomData,
        }
    }
}

impl Drop for SnapshotScope {
    fn drop(&mut self) {
        replace_current(self.previous.take());
    }
}

impl std::fmt::Debug for SnapshotScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotScope")
            .field("previous", &self.previous)
            .finish()
    }
}
