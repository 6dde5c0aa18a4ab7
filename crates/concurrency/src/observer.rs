//! Observer registries
//!
//! - Read observers fire on every state read while their snapshot is current.
//! - Write observers fire the first time an object is written in a snapshot.
//! - Apply observers fire after a root-level publication with the exact set
//!   of objects that changed.
//! - Global write observers fire on the first write to an object in each
//!   global epoch, for writes made with no snapshot entered. The matching
//!   apply notification is deferred until `send_apply_notifications` (or the
//!   next snapshot is taken) so many writes coalesce into one batch.
//!
//! Observers are always invoked with the runtime lock released.

use crate::object::StateObject;
use crate::runtime::with_runtime;
use crate::snapshot::{advance_global_snapshot, Snapshot};
use std::sync::Arc;
use tracing::debug;

/// Callback fired on each read of a state object
pub type ReadObserver = Arc<dyn Fn(&dyn StateObject) + Send + Sync>;

/// Callback fired on the first write of a state object in a snapshot
pub type WriteObserver = Arc<dyn Fn(&dyn StateObject) + Send + Sync>;

/// Callback fired after changes are published
pub type ApplyObserver = Arc<dyn Fn(&[Arc<dyn StateObject>], &Snapshot) + Send + Sync>;

/// Ordered list of registered observers keyed by registration id
pub(crate) struct ObserverList<O> {
    next_id: u64,
    entries: Vec<(u64, O)>,
}

impl<O: Clone> ObserverList<O> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, observer: O) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub(crate) fn unregister(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Copy of the current observers, for invoking outside the lock
    pub(crate) fn snapshot(&self) -> Vec<O> {
        self.entries.iter().map(|(_, observer)| observer.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObserverKind {
    Apply,
    GlobalWrite,
}

/// Registration handle returned by observer registration
///
/// The observer stays registered until [`dispose`](ObserverHandle::dispose)
/// is called or the handle is dropped.
#[must_use = "dropping the handle unregisters the observer"]
pub struct ObserverHandle {
    kind: ObserverKind,
    id: u64,
    released: bool,
}

impl ObserverHandle {
    /// Unregister the observer
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let (kind, id) = (self.kind, self.id);
        with_runtime(|rt| match kind {
            ObserverKind::Apply => rt.apply_observers.unregister(id),
            ObserverKind::GlobalWrite => rt.global_write_observers.unregister(id),
        });
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

/// Register a callback fired after every root-level publication
///
/// The callback receives the changed objects (sorted by id) and the snapshot
/// that published them.
pub fn register_apply_observer<F>(observer: F) -> ObserverHandle
where
    F: Fn(&[Arc<dyn StateObject>], &Snapshot) + Send + Sync + 'static,
{
    let (id, registered) = with_runtime(|rt| {
        let id = rt.apply_observers.register(Arc::new(observer));
        (id, rt.apply_observers.len())
    });
    debug!(target: "strata::snapshot", observer = id, registered, "Apply observer registered");
    ObserverHandle {
        kind: ObserverKind::Apply,
        id,
        released: false,
    }
}

/// Register a callback fired on writes made against the global snapshot
///
/// Registration advances the global snapshot, so the new observer sees the
/// first write to every object from now on.
pub fn register_global_write_observer<F>(observer: F) -> ObserverHandle
where
    F: Fn(&dyn StateObject) + Send + Sync + 'static,
{
    let (id, registered) = with_runtime(|rt| {
        let id = rt.global_write_observers.register(Arc::new(observer));
        (id, rt.global_write_observers.len())
    });
    advance_global_snapshot();
    debug!(target: "strata::snapshot", observer = id, registered, "Global write observer registered");
    ObserverHandle {
        kind: ObserverKind::GlobalWrite,
        id,
        released: false,
    }
}

pub(crate) fn notify_apply(observers: &[ApplyObserver], changed: &[Arc<dyn StateObject>], snapshot: &Snapshot) {
    if changed.is_empty() {
        return;
    }
    for observer in observers {
        observer(changed, snapshot);
    }
}

pub(crate) fn notify_each(observers: &[WriteObserver], object: &dyn StateObject) {
    for observer in observers {
        observer(object);
    }
}
