//! Mutation policies for `MutableState`
//!
//! A policy answers two questions about a state's values:
//! - Are two values equivalent? Equivalent writes are skipped, and an apply
//!   whose value equals the concurrently published one is not a conflict.
//! - Can three versions (previous, current, applied) be merged into one?
//!   Only asked when concurrent writes differ.
//!
//! `merge` may run twice for one apply and must be pure.

use std::fmt;
use std::sync::Arc;

/// Equality and merge rules for a state's values
pub trait MutationPolicy<T>: Send + Sync + 'static {
    /// Check whether two values are interchangeable
    fn equivalent(&self, a: &T, b: &T) -> bool;

    /// Merge concurrent writes
    ///
    /// - `previous`: value the applying snapshot started from
    /// - `current`: value published concurrently
    /// - `applied`: value the applying snapshot wrote
    ///
    /// Returns `None` to report a conflict (the default).
    fn merge(&self, previous: &T, current: &T, applied: &T) -> Option<T> {
        let _ = (previous, current, applied);
        None
    }
}

/// Values are equivalent when `==` says so
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuralEqualityPolicy;

impl<T: PartialEq> MutationPolicy<T> for StructuralEqualityPolicy {
    fn equivalent(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

/// No two values are equivalent; every write is recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverEqualPolicy;

impl<T> MutationPolicy<T> for NeverEqualPolicy {
    fn equivalent(&self, _a: &T, _b: &T) -> bool {
        false
    }
}

/// Shared values are equivalent only when they are the same allocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferentialEqualityPolicy;

impl<U: ?Sized + Send + Sync + 'static> MutationPolicy<Arc<U>> for ReferentialEqualityPolicy {
    fn equivalent(&self, a: &Arc<U>, b: &Arc<U>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

/// Structural equality plus a merge function
///
/// ```ignore
/// // Concurrent increments combine instead of conflicting
/// let hits = MutableState::with_policy(0u64, MergeWith(|prev: &u64, cur: &u64, app: &u64| {
///     Some(cur + app - prev)
/// }));
/// ```
#[derive(Clone, Copy)]
pub struct MergeWith<F>(pub F);

impl<T, F> MutationPolicy<T> for MergeWith<F>
where
    T: PartialEq,
    F: Fn(&T, &T, &T) -> Option<T> + Send + Sync + 'static,
{
    fn equivalent(&self, a: &T, b: &T) -> bool {
        a == b
    }

    fn merge(&self, previous: &T, current: &T, applied: &T) -> Option<T> {
        (self.0)(previous, current, applied)
    }
}

impl<F> fmt::Debug for MergeWith<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MergeWith(..)")
    }
}
