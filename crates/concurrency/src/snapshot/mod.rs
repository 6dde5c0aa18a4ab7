//! Snapshot handles
//!
//! A `Snapshot` is an isolated, point-in-time view over every state object.
//! All kinds share one handle type; their behavior varies along two axes:
//!
//! | access \ placement | Global | Root | Nested | Transparent |
//! |--------------------|--------|------|--------|-------------|
//! | Mutable            | Global | Mutable | NestedMutable | TransparentMutable |
//! | ReadOnly           | -      | Readonly | NestedReadonly | TransparentReadonly |
//!
//! ## Lifecycle
//!
//! ```text
//! Mutable:   Open -> Applied -> Disposed
//!            Open -> Disposed (abandoned once all nested snapshots are gone)
//! ReadOnly:  Open -> Disposed
//! Global:    always open; replaced by a fresh global after each publication
//! ```
//!
//! Each snapshot keeps an activation count: one for itself plus one per
//! nested snapshot taken from it. A mutable snapshot that never applied is
//! abandoned when the count reaches zero; its records are retagged
//! `INVALID_SNAPSHOT` and its ids closed.
//!
//! Entering a snapshot (`enter`/`install`) only changes the thread-local
//! current snapshot; it is not a lifecycle transition.

mod global;
mod mutable;
mod nested;
mod readonly;
mod transparent;

pub(crate) use global::{advance_global_snapshot, reclaim_after_publication};
pub use global::send_apply_notifications;
pub use transparent::observe;

use crate::current::{current_snapshot, SnapshotScope};
use crate::object::StateObject;
use crate::observer::{ReadObserver, WriteObserver};
use crate::pinning::PinHandle;
use crate::runtime::{with_runtime, Runtime};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use strata_core::{Error, ObjectId, Result, SnapshotId, SnapshotIdSet};

/// Whether a snapshot accepts writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Writes are rejected with `Error::ReadOnlyWrite`
    ReadOnly,
    /// Writes create records tagged with the snapshot's id
    Mutable,
}

/// Where a snapshot sits in the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// The process-wide global snapshot
    Global,
    /// Taken from the global snapshot
    Root,
    /// Taken from another snapshot
    Nested,
    /// Shares its parent's view and only adds observers
    Transparent,
}

/// Snapshot kind, derived from access and placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// The global snapshot
    Global,
    /// Root mutable snapshot
    Mutable,
    /// Mutable snapshot nested in another mutable snapshot
    NestedMutable,
    /// Root read-only snapshot
    Readonly,
    /// Read-only snapshot nested in another snapshot
    NestedReadonly,
    /// Observer wrapper over a mutable snapshot
    TransparentMutable,
    /// Observer wrapper over a read-only snapshot
    TransparentReadonly,
}

/// Result of applying a mutable snapshot
#[must_use = "a failed apply publishes nothing"]
#[derive(Debug)]
pub enum SnapshotApplyResult {
    /// Every change is now visible
    Success,
    /// A concurrent change could not be merged; nothing became visible
    Failure(Snapshot),
}

impl SnapshotApplyResult {
    /// Check if the apply succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, SnapshotApplyResult::Success)
    }

    /// Check if the apply failed
    pub fn is_failure(&self) -> bool {
        matches!(self, SnapshotApplyResult::Failure(_))
    }

    /// Convert a failure into `Error::ApplyConflict`
    pub fn check(self) -> Result<()> {
        match self {
            SnapshotApplyResult::Success => Ok(()),
            SnapshotApplyResult::Failure(snapshot) => Err(Error::ApplyConflict {
                snapshot_id: snapshot.id(),
            }),
        }
    }
}

/// Mutable bookkeeping of one snapshot
///
/// Mutated only while the runtime lock is held, except for the modified and
/// created sets which the owning thread may extend under this lock alone.
pub(crate) struct SnapshotState {
    pub(crate) id: SnapshotId,
    pub(crate) invalid: SnapshotIdSet,
    pub(crate) pin: Option<PinHandle>,
    /// Ids this snapshot used before advancing, plus ids of applied children
    pub(crate) previous_ids: SnapshotIdSet,
    pub(crate) previous_pins: Vec<PinHandle>,
    pub(crate) modified: FxHashMap<ObjectId, Arc<dyn StateObject>>,
    /// Objects created inside this snapshot
    pub(crate) created: Vec<Weak<dyn StateObject>>,
    /// Self plus active nested snapshots
    pub(crate) active: usize,
    /// False for nested read-only snapshots sharing their parent's id
    pub(crate) owns_id: bool,
    pub(crate) disposed: bool,
    pub(crate) applied: bool,
    /// Ids closed (published or abandoned)
    pub(crate) closed: bool,
    /// Nested snapshot already reported itself inactive to its parent
    pub(crate) deactivated: bool,
}

impl SnapshotState {
    fn new(id: SnapshotId, invalid: SnapshotIdSet, pin: Option<PinHandle>) -> Self {
        Self {
            id,
            invalid,
            pin,
            previous_ids: SnapshotIdSet::EMPTY,
            previous_pins: Vec::new(),
            modified: FxHashMap::default(),
            created: Vec::new(),
            active: 1,
            owns_id: true,
            disposed: false,
            applied: false,
            closed: false,
            deactivated: false,
        }
    }

    pub(crate) fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed {
                snapshot_id: self.id,
            });
        }
        Ok(())
    }

    /// Fail unless the snapshot can still be written and applied
    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.ensure_not_disposed()?;
        if self.applied {
            return Err(Error::AlreadyApplied {
                snapshot_id: self.id,
            });
        }
        Ok(())
    }

    /// Pins to release once the snapshot's ids are closed
    pub(crate) fn take_pins(&mut self) -> Vec<PinHandle> {
        let mut pins = std::mem::take(&mut self.previous_pins);
        pins.extend(self.pin.take());
        pins
    }

    pub(crate) fn modified_sorted(&self) -> Vec<Arc<dyn StateObject>> {
        sorted_objects(self.modified.values().cloned().collect())
    }
}

pub(crate) fn sorted_objects(mut objects: Vec<Arc<dyn StateObject>>) -> Vec<Arc<dyn StateObject>> {
    objects.sort_by_key(|object| object.object_id());
    objects
}

struct SnapshotInner {
    access: Access,
    placement: Placement,
    parent: Option<Snapshot>,
    read_observers: Vec<ReadObserver>,
    write_observers: Vec<WriteObserver>,
    state: Mutex<SnapshotState>,
}

/// Handle to a snapshot
///
/// Cloning the handle does not create a new snapshot; all clones refer to
/// the same one.
#[derive(Clone)]
pub struct Snapshot {
    inner: Arc<SnapshotInner>,
}

impl Snapshot {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        access: Access,
        placement: Placement,
        parent: Option<Snapshot>,
        read_observers: Vec<ReadObserver>,
        write_observers: Vec<WriteObserver>,
        id: SnapshotId,
        invalid: SnapshotIdSet,
        pin: Option<PinHandle>,
    ) -> Self {
        Self {
            inner: Arc::new(SnapshotInner {
                access,
                placement,
                parent,
                read_observers,
                write_observers,
                state: Mutex::new(SnapshotState::new(id, invalid, pin)),
            }),
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SnapshotState> {
        self.inner.state.lock()
    }

    pub(crate) fn read_observers(&self) -> &[ReadObserver] {
        &self.inner.read_observers
    }

    pub(crate) fn write_observers(&self) -> &[WriteObserver] {
        &self.inner.write_observers
    }

    /// Id of this snapshot
    ///
    /// A mutable snapshot's id changes when it advances (taking a nested
    /// snapshot, applying with merges, `notify_objects_initialized`).
    pub fn id(&self) -> SnapshotId {
        self.read_view().0
    }

    /// Ids this snapshot treats as not yet visible
    pub fn invalid(&self) -> SnapshotIdSet {
        self.read_view().1
    }

    /// Id and invalid set, read atomically
    pub(crate) fn read_view(&self) -> (SnapshotId, SnapshotIdSet) {
        if self.inner.placement == Placement::Transparent {
            return self.target().read_view();
        }
        let state = self.lock_state();
        (state.id, state.invalid.clone())
    }

    /// Whether writes are rejected
    pub fn access(&self) -> Access {
        self.inner.access
    }

    /// Position in the snapshot hierarchy
    pub fn placement(&self) -> Placement {
        self.inner.placement
    }

    /// Kind of this snapshot
    pub fn kind(&self) -> SnapshotKind {
        match (self.inner.access, self.inner.placement) {
            (_, Placement::Global) => SnapshotKind::Global,
            (Access::Mutable, Placement::Root) => SnapshotKind::Mutable,
            (Access::Mutable, Placement::Nested) => SnapshotKind::NestedMutable,
            (Access::ReadOnly, Placement::Root) => SnapshotKind::Readonly,
            (Access::ReadOnly, Placement::Nested) => SnapshotKind::NestedReadonly,
            (Access::Mutable, Placement::Transparent) => SnapshotKind::TransparentMutable,
            (Access::ReadOnly, Placement::Transparent) => SnapshotKind::TransparentReadonly,
        }
    }

    /// Check if writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.inner.access == Access::ReadOnly
    }

    /// Check if the snapshot has been disposed
    pub fn is_disposed(&self) -> bool {
        self.lock_state().disposed
    }

    /// Check if the snapshot has been applied
    pub fn is_applied(&self) -> bool {
        self.lock_state().applied
    }

    /// Check whether a store into a record tagged `id` may still land
    ///
    /// False once the snapshot is disposed, applied or retired, or has
    /// advanced past `id`: by then a record tagged `id` is either visible to
    /// other snapshots or about to be. Called with the record's value lock
    /// held; no state lock is ever held while taking a value lock.
    pub(crate) fn writes_land_as(&self, id: SnapshotId) -> bool {
        let state = self.lock_state();
        state.id == id && !state.disposed && !state.applied && !state.closed
    }

    /// Snapshot this one was taken from
    pub fn parent(&self) -> Option<&Snapshot> {
        self.inner.parent.as_ref()
    }

    /// Check if two handles refer to the same snapshot
    pub fn same_snapshot(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check if the snapshot holds unpublished writes
    pub fn has_pending_changes(&self) -> bool {
        if self.inner.placement == Placement::Transparent {
            return self.target().has_pending_changes();
        }
        !self.lock_state().modified.is_empty()
    }

    /// Objects written in this snapshot, sorted by id
    pub fn modified_objects(&self) -> Vec<Arc<dyn StateObject>> {
        if self.inner.placement == Placement::Transparent {
            return self.target().modified_objects();
        }
        self.lock_state().modified_sorted()
    }

    /// Make this the thread's current snapshot until the scope is dropped
    pub fn install(&self) -> Result<SnapshotScope> {
        self.lock_state().ensure_not_disposed()?;
        Ok(SnapshotScope::install(self.clone()))
    }

    /// Run `f` with this snapshot as the thread's current snapshot
    ///
    /// The previous snapshot is restored when `f` returns or unwinds.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let _scope = self.install()?;
        Ok(f())
    }

    /// Take a read-only snapshot of this snapshot's current view
    ///
    /// From the global snapshot this creates a root read-only snapshot.
    pub fn take_nested_snapshot(&self, read_observer: Option<ReadObserver>) -> Result<Snapshot> {
        self.take_nested(Access::ReadOnly, read_observer.into_iter().collect(), Vec::new())
    }

    /// Take a mutable snapshot whose writes fold into this one on apply
    ///
    /// From the global snapshot this creates a root mutable snapshot.
    pub fn take_nested_mutable_snapshot(
        &self,
        read_observer: Option<ReadObserver>,
        write_observer: Option<WriteObserver>,
    ) -> Result<Snapshot> {
        self.take_nested(
            Access::Mutable,
            read_observer.into_iter().collect(),
            write_observer.into_iter().collect(),
        )
    }

    fn take_nested(
        &self,
        access: Access,
        read_observers: Vec<ReadObserver>,
        write_observers: Vec<WriteObserver>,
    ) -> Result<Snapshot> {
        match (self.inner.access, self.inner.placement) {
            (_, Placement::Global) => Ok(global::take_root_snapshot(
                access,
                read_observers,
                write_observers,
            )),
            (_, Placement::Transparent) => {
                let mut read_observers = read_observers;
                read_observers.extend(self.inner.read_observers.iter().cloned());
                let mut write_observers = write_observers;
                write_observers.extend(self.inner.write_observers.iter().cloned());
                self.target().take_nested(access, read_observers, write_observers)
            }
            (Access::Mutable, _) => self.take_nested_of_mutable(access, read_observers, write_observers),
            (Access::ReadOnly, _) => match access {
                Access::ReadOnly => self.take_nested_of_readonly(read_observers),
                Access::Mutable => Err(Error::Unsupported(
                    "cannot take a mutable snapshot of a read-only snapshot".to_string(),
                )),
            },
        }
    }

    /// Publish this snapshot's writes
    ///
    /// A root snapshot publishes globally; a nested snapshot folds its writes
    /// into its parent. Conflicts are reported as
    /// `SnapshotApplyResult::Failure`; misuse (disposed, already applied,
    /// read-only) is an error.
    pub fn apply(&self) -> Result<SnapshotApplyResult> {
        match (self.inner.access, self.inner.placement) {
            (_, Placement::Global) => Err(Error::Unsupported(
                "the global snapshot cannot be applied".to_string(),
            )),
            (_, Placement::Transparent) => Err(Error::Unsupported(
                "transparent snapshots cannot be applied".to_string(),
            )),
            (Access::ReadOnly, _) => Err(Error::Unsupported(
                "read-only snapshots cannot be applied".to_string(),
            )),
            (Access::Mutable, Placement::Root) => self.apply_root(),
            (Access::Mutable, Placement::Nested) => self.apply_nested(),
        }
    }

    /// Release the snapshot
    ///
    /// Disposing a mutable snapshot that never applied abandons its writes.
    /// Disposing twice is a no-op; disposing the global snapshot does nothing.
    pub fn dispose(&self) {
        match (self.inner.access, self.inner.placement) {
            (_, Placement::Global) => {}
            (_, Placement::Transparent) => self.lock_state().disposed = true,
            (Access::ReadOnly, _) => self.dispose_readonly(),
            (Access::Mutable, _) => self.dispose_mutable(),
        }
    }

    /// Start tracking writes to objects created so far in this snapshot
    ///
    /// Objects created inside a snapshot carry the snapshot's id, so writes
    /// to them are invisible to the apply engine. Advancing the snapshot
    /// gives later writes a fresh id that is tracked like any other write.
    pub fn notify_objects_initialized(&self) {
        match (self.inner.access, self.inner.placement) {
            (_, Placement::Transparent) => self.target().notify_objects_initialized(),
            (Access::Mutable, Placement::Root | Placement::Nested) => {
                with_runtime(|rt| self.advance_locked(rt));
            }
            _ => {}
        }
    }

    /// Give a mutable snapshot a fresh id
    ///
    /// The old id is remembered as a previous id, so records written under it
    /// stay visible to this snapshot and are published with it.
    pub(crate) fn advance_locked(&self, rt: &mut Runtime) {
        let mut state = self.lock_state();
        let previous = state.id;
        state.previous_ids = state.previous_ids.set(previous);
        if !state.applied && !state.disposed {
            let id = rt.open_new_id();
            state.id = id;
            state.invalid = state.invalid.add_range(previous + 1, id);
        }
    }

    /// A nested snapshot of this one was disposed or applied
    pub(crate) fn nested_deactivated(&self) {
        with_runtime(|rt| {
            let (inactive, applied, owns_id) = {
                let mut state = self.lock_state();
                state.active = state.active.saturating_sub(1);
                (state.active == 0, state.applied, state.owns_id)
            };
            match self.inner.access {
                Access::Mutable if inactive && !applied => self.abandon_locked(rt),
                Access::ReadOnly if inactive && owns_id => self.close_readonly_locked(rt),
                _ => {}
            }
        });
    }

    /// Run read observers for a read of `object`
    pub(crate) fn notify_read(&self, object: &dyn StateObject) {
        for observer in &self.inner.read_observers {
            observer(object);
        }
        if self.inner.placement == Placement::Transparent {
            if let Some(parent) = &self.inner.parent {
                parent.notify_read(object);
            }
        }
    }

    /// Remember an object created inside this snapshot
    pub(crate) fn record_created(&self, object: &Arc<dyn StateObject>) {
        match (self.inner.access, self.inner.placement) {
            (_, Placement::Transparent) => self.target().record_created(object),
            (Access::Mutable, Placement::Root | Placement::Nested) => {
                let mut state = self.lock_state();
                if !state.disposed && !state.applied {
                    state.created.push(Arc::downgrade(object));
                }
            }
            _ => {}
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Take a read-only snapshot of the current snapshot
///
/// With no snapshot entered this takes a root read-only snapshot of the
/// global state.
pub fn take_snapshot(read_observer: Option<ReadObserver>) -> Result<Snapshot> {
    current_snapshot().take_nested_snapshot(read_observer)
}

/// Take a mutable snapshot of the current snapshot
///
/// With no snapshot entered this takes a root mutable snapshot; inside a
/// mutable snapshot it takes a nested one. Fails inside a read-only snapshot.
pub fn take_mutable_snapshot(
    read_observer: Option<ReadObserver>,
    write_observer: Option<WriteObserver>,
) -> Result<Snapshot> {
    current_snapshot().take_nested_mutable_snapshot(read_observer, write_observer)
}

/// Start tracking writes to objects created in the current snapshot
pub fn notify_objects_initialized() {
    current_snapshot().notify_objects_initialized();
}
