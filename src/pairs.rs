//! Canonical projections of abstract states and the sets caches keep them in.
//!
//! A state is projected into a [`StateHash`]: a key-sorted list of
//! `(Key, ValueId)` pairs. Subset caches accumulate those pairs into a
//! [`CachePairSet`] (the union of everything observed at a program point),
//! while equality caches keep whole snapshots in an [`EqualityCacheSet`].
//!
//! ```text
//! state:      { x -> [0, 1], y -> null }
//! hash:       [(k1, #4), (k2, #0)]
//! pair set:   {(k1, #3), (k1, #4), (k2, #0)}   // after also seeing x -> [0, 0]
//! ```

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;

use crate::types::{Key, Pair, ValueId};

/// Key-sorted projection of one abstract state.
///
/// Duplicate keys are allowed: a key may map to several observed ids (e.g. a
/// may-point-to set projected one target at a time).
#[derive(Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StateHash {
    pairs: Vec<Pair>,
}

impl StateHash {
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pairs: Vec::with_capacity(capacity),
        }
    }

    /// Appends a pair. Callers that do not push in key order must call
    /// [`normalize`][Self::normalize] afterwards.
    pub fn push(&mut self, key: Key, id: ValueId) {
        self.pairs.push((key, id));
    }

    /// Sorts the pairs and removes exact duplicates.
    pub fn normalize(&mut self) {
        self.pairs.sort_unstable();
        self.pairs.dedup();
    }

    pub fn is_sorted(&self) -> bool {
        self.pairs.windows(2).all(|w| w[0] <= w[1])
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pair> {
        self.pairs.iter()
    }

    pub fn as_slice(&self) -> &[Pair] {
        &self.pairs
    }

    /// Keeps only the pairs whose key is in `keys` (which must be sorted).
    pub fn restricted_to(&self, keys: &[Key]) -> StateHash {
        debug_assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        let pairs = self
            .pairs
            .iter()
            .filter(|(k, _)| keys.binary_search(k).is_ok())
            .copied()
            .collect();
        StateHash { pairs }
    }
}

impl FromIterator<Pair> for StateHash {
    fn from_iter<I: IntoIterator<Item = Pair>>(iter: I) -> Self {
        let mut hash = StateHash {
            pairs: iter.into_iter().collect(),
        };
        hash.normalize();
        hash
    }
}

impl<'a> IntoIterator for &'a StateHash {
    type Item = &'a Pair;
    type IntoIter = std::slice::Iter<'a, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({}, {})", k, v)?;
        }
        write!(f, "]")
    }
}

/// Ordered set of `(Key, ValueId)` pairs: the running state of a subset cache.
///
/// In "bottom" mode the set only grows. In "top" mode a key may be removed as a
/// whole (meaning "unconstrained"), never partially.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CachePairSet {
    pairs: BTreeSet<Pair>,
}

fn key_range(key: Key) -> RangeInclusive<Pair> {
    (key, ValueId::MIN)..=(key, ValueId::MAX)
}

impl CachePairSet {
    pub fn new() -> Self {
        Self { pairs: BTreeSet::new() }
    }

    /// Inserts a pair. Returns `true` if it was not already present.
    pub fn insert(&mut self, pair: Pair) -> bool {
        self.pairs.insert(pair)
    }

    /// Inserts every pair of `hash`. Returns `true` if anything was added.
    pub fn extend_from(&mut self, hash: &StateHash) -> bool {
        let mut added = false;
        for &p in hash {
            added |= self.pairs.insert(p);
        }
        added
    }

    pub fn contains(&self, pair: &Pair) -> bool {
        self.pairs.contains(pair)
    }

    pub fn contains_key(&self, key: Key) -> bool {
        self.values_with_key(key).next().is_some()
    }

    /// All pairs recorded for `key`, in id order.
    pub fn values_with_key(&self, key: Key) -> btree_set::Range<'_, Pair> {
        self.pairs.range(key_range(key))
    }

    /// Removes every pair for `key`. Returns the number of pairs removed.
    pub fn remove_key(&mut self, key: Key) -> usize {
        let doomed: Vec<Pair> = self.values_with_key(key).copied().collect();
        for p in &doomed {
            self.pairs.remove(p);
        }
        doomed.len()
    }

    /// First key strictly greater than `key`, if any.
    pub(crate) fn next_key_after(&self, key: Key) -> Option<Key> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.pairs
            .range((Excluded((key, ValueId::MAX)), Unbounded))
            .next()
            .map(|&(k, _)| k)
    }

    pub fn first_key(&self) -> Option<Key> {
        self.pairs.first().map(|&(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn iter(&self) -> btree_set::Iter<'_, Pair> {
        self.pairs.iter()
    }
}

impl FromIterator<Pair> for CachePairSet {
    fn from_iter<I: IntoIterator<Item = Pair>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

impl From<&StateHash> for CachePairSet {
    fn from(hash: &StateHash) -> Self {
        hash.iter().copied().collect()
    }
}

impl<'a> IntoIterator for &'a CachePairSet {
    type Item = &'a Pair;
    type IntoIter = btree_set::Iter<'a, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

/// Set of whole-state snapshots, compared lexicographically.
pub type EqualityCacheSet = BTreeSet<StateHash>;
