//! Immutable set of snapshot ids
//!
//! A `SnapshotIdSet` records the ids a snapshot must treat as not-yet-visible:
//! transactions that were open (or not yet allocated) when the snapshot was
//! taken. Every operation returns a new set; existing sets are never mutated,
//! so a set can be shared freely between snapshots and threads.
//!
//! # Representation
//!
//! Ids are overwhelmingly allocated and closed near the top of the id range,
//! so the set keeps a 128-bit window of recent ids as two bitmaps and spills
//! anything older into a sorted array:
//!
//! ```text
//!  below (sorted array)  |  lower (64 bits)          |  upper (64 bits)
//!  ids < lower_bound     |  [lower_bound, +64)        |  [lower_bound + 64, +128)
//! ```
//!
//! Setting an id above the window slides the window up, moving set bits of
//! the lower bitmap into the array. `lower_bound` is always a multiple of 64.

use crate::types::SnapshotId;
use std::fmt;
use std::sync::Arc;

const WORD_BITS: u64 = 64;

/// Immutable set of snapshot ids
#[derive(Clone)]
pub struct SnapshotIdSet {
    /// Bits for ids in `[lower_bound + 64, lower_bound + 128)`
    upper: u64,
    /// Bits for ids in `[lower_bound, lower_bound + 64)`
    lower: u64,
    /// First id covered by the bit window
    lower_bound: SnapshotId,
    /// Sorted ids below `lower_bound`
    below: Option<Arc<[SnapshotId]>>,
}

impl SnapshotIdSet {
    /// The empty set
    pub const EMPTY: SnapshotIdSet = SnapshotIdSet {
        upper: 0,
        lower: 0,
        lower_bound: 0,
        below: None,
    };

    /// Create an empty set
    pub fn new() -> Self {
        Self::EMPTY
    }

    /// Check whether `id` is a member of the set
    pub fn get(&self, id: SnapshotId) -> bool {
        if id >= self.lower_bound {
            let offset = id - self.lower_bound;
            if offset < WORD_BITS {
                self.lower & (1u64 << offset) != 0
            } else if offset < WORD_BITS * 2 {
                self.upper & (1u64 << (offset - WORD_BITS)) != 0
            } else {
                false
            }
        } else {
            self.below
                .as_deref()
                .is_some_and(|below| below.binary_search(&id).is_ok())
        }
    }

    /// Return a set that also contains `id`
    pub fn set(&self, id: SnapshotId) -> Self {
        if id < self.lower_bound {
            return self.set_below(id);
        }

        let offset = id - self.lower_bound;
        if offset < WORD_BITS {
            let mask = 1u64 << offset;
            if self.lower & mask != 0 {
                return self.clone();
            }
            return Self {
                lower: self.lower | mask,
                ..self.clone()
            };
        }
        if offset < WORD_BITS * 2 {
            let mask = 1u64 << (offset - WORD_BITS);
            if self.upper & mask != 0 {
                return self.clone();
            }
            return Self {
                upper: self.upper | mask,
                ..self.clone()
            };
        }

        self.slide_to(id).set(id)
    }

    /// Return a set without `id`
    pub fn clear(&self, id: SnapshotId) -> Self {
        if id >= self.lower_bound {
            let offset = id - self.lower_bound;
            if offset < WORD_BITS {
                let mask = 1u64 << offset;
                if self.lower & mask == 0 {
                    return self.clone();
                }
                return Self {
                    lower: self.lower & !mask,
                    ..self.clone()
                };
            }
            if offset < WORD_BITS * 2 {
                let mask = 1u64 << (offset - WORD_BITS);
                if self.upper & mask == 0 {
                    return self.clone();
                }
                return Self {
                    upper: self.upper & !mask,
                    ..self.clone()
                };
            }
            return self.clone();
        }

        let Some(below) = self.below.as_deref() else {
            return self.clone();
        };
        match below.binary_search(&id) {
            Ok(pos) => {
                let remaining: Vec<SnapshotId> = below[..pos]
                    .iter()
                    .chain(below[pos + 1..].iter())
                    .copied()
                    .collect();
                Self {
                    below: if remaining.is_empty() {
                        None
                    } else {
                        Some(Arc::from(remaining))
                    },
                    ..self.clone()
                }
            }
            Err(_) => self.clone(),
        }
    }

    /// Return a set that also contains every id in `[from, until)`
    pub fn add_range(&self, from: SnapshotId, until: SnapshotId) -> Self {
        let mut result = self.clone();
        let mut id = from;
        while id < until {
            result = result.set(id);
            id += 1;
        }
        result
    }

    /// Union of two sets
    pub fn or(&self, other: &SnapshotIdSet) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        if self.lower_bound == other.lower_bound {
            if other.below.is_none() {
                return Self {
                    upper: self.upper | other.upper,
                    lower: self.lower | other.lower,
                    ..self.clone()
                };
            }
            if self.below.is_none() {
                return Self {
                    upper: self.upper | other.upper,
                    lower: self.lower | other.lower,
                    ..other.clone()
                };
            }
        }
        other.iter().fold(self.clone(), |acc, id| acc.set(id))
    }

    /// Difference: ids in `self` that are not in `other`
    pub fn and_not(&self, other: &SnapshotIdSet) -> Self {
        if other.is_empty() || self.is_empty() {
            return self.clone();
        }
        if self.lower_bound == other.lower_bound && other.below.is_none() {
            return Self {
                upper: self.upper & !other.upper,
                lower: self.lower & !other.lower,
                ..self.clone()
            };
        }
        other.iter().fold(self.clone(), |acc, id| acc.clear(id))
    }

    /// Lowest id in the set, or `default` if the set is empty
    pub fn lowest(&self, default: SnapshotId) -> SnapshotId {
        if let Some(first) = self.below.as_deref().and_then(|below| below.first()) {
            return *first;
        }
        if self.lower != 0 {
            return self.lower_bound + u64::from(self.lower.trailing_zeros());
        }
        if self.upper != 0 {
            return self.lower_bound + WORD_BITS + u64::from(self.upper.trailing_zeros());
        }
        default
    }

    /// Check if the set has no members
    pub fn is_empty(&self) -> bool {
        self.lower == 0 && self.upper == 0 && self.below.is_none()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.below.as_deref().map_or(0, |below| below.len())
            + self.lower.count_ones() as usize
            + self.upper.count_ones() as usize
    }

    /// Iterate members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = SnapshotId> + '_ {
        let base = self.lower_bound;
        let lower = self.lower;
        let upper = self.upper;
        self.below
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .copied()
            .chain(
                (0..WORD_BITS)
                    .filter(move |bit| lower & (1u64 << bit) != 0)
                    .map(move |bit| base + bit),
            )
            .chain(
                (0..WORD_BITS)
                    .filter(move |bit| upper & (1u64 << bit) != 0)
                    .map(move |bit| base + WORD_BITS + bit),
            )
    }

    fn set_below(&self, id: SnapshotId) -> Self {
        let Some(below) = self.below.as_deref() else {
            return Self {
                below: Some(Arc::from(vec![id])),
                ..self.clone()
            };
        };
        match below.binary_search(&id) {
            Ok(_) => self.clone(),
            Err(pos) => {
                let mut ids = Vec::with_capacity(below.len() + 1);
                ids.extend_from_slice(&below[..pos]);
                ids.push(id);
                ids.extend_from_slice(&below[pos..]);
                Self {
                    below: Some(Arc::from(ids)),
                    ..self.clone()
                }
            }
        }
    }

    /// Move the bit window up so that `id` falls inside it
    fn slide_to(&self, id: SnapshotId) -> Self {
        let target = (id / WORD_BITS) * WORD_BITS;
        let mut upper = self.upper;
        let mut lower = self.lower;
        let mut lower_bound = self.lower_bound;
        let mut spilled: Option<Vec<SnapshotId>> = None;

        while lower_bound < target {
            if lower != 0 {
                let ids = spilled.get_or_insert_with(|| {
                    self.below
                        .as_deref()
                        .map(|below| below.to_vec())
                        .unwrap_or_default()
                });
                ids.extend(
                    (0..WORD_BITS)
                        .filter(|bit| lower & (1u64 << bit) != 0)
                        .map(|bit| lower_bound + bit),
                );
            }
            if upper == 0 {
                lower_bound = target;
                lower = 0;
                break;
            }
            lower = upper;
            upper = 0;
            lower_bound += WORD_BITS;
        }

        Self {
            upper,
            lower,
            lower_bound,
            below: match spilled {
                Some(ids) => Some(Arc::from(ids)),
                None => self.below.clone(),
            },
        }
    }
}

impl Default for SnapshotIdSet {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PartialEq for SnapshotIdSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for SnapshotIdSet {}

impl fmt::Debug for SnapshotIdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<SnapshotId> for SnapshotIdSet {
    fn from_iter<I: IntoIterator<Item = SnapshotId>>(iter: I) -> Self {
        iter.into_iter()
            .fold(SnapshotIdSet::EMPTY, |acc, id| acc.set(id))
    }
}
