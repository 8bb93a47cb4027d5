//! Type-safe wrappers for cache keys and value ids.
//!
//! This module provides newtype wrappers that enforce compile-time distinction
//! between the location a fact is about (a [`Key`]) and the canonical number
//! assigned to the fact's value (a [`ValueId`]), preventing the two from being
//! swapped when building state hashes.
use std::fmt;

/// An analysis location (variable, expression, heap cell, ...).
///
/// Keys are totally ordered; state hashes and cache pair sets are sorted by key
/// first, so all the values observed for one key are contiguous.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Key(u32);

impl Key {
    /// Creates a key with the given raw index.
    pub const fn new(index: u32) -> Self {
        Key(index)
    }

    /// Returns the raw key index as a `u32`.
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.0)
    }
}

impl From<u32> for Key {
    fn from(index: u32) -> Self {
        Key(index)
    }
}

impl From<Key> for u32 {
    fn from(key: Key) -> Self {
        key.0
    }
}

/// A canonical value number handed out by a unique-id projector.
///
/// # Invariants
///
/// - Two values receive the same id iff the projector considers them equal
/// - Ids are stable for the lifetime of the projector (until it is cleared)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValueId(u32);

impl ValueId {
    /// The smallest id, used as the lower bound of a per-key range.
    pub const MIN: ValueId = ValueId(0);
    /// The largest id, used as the upper bound of a per-key range.
    pub const MAX: ValueId = ValueId(u32::MAX);

    /// Creates a value id from a raw index.
    pub const fn new(index: u32) -> Self {
        ValueId(index)
    }

    /// Returns the raw index as a `u32`.
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for ValueId {
    fn from(index: u32) -> Self {
        ValueId(index)
    }
}

impl From<ValueId> for u32 {
    fn from(id: ValueId) -> Self {
        id.0
    }
}

/// One observed fact: `key` currently holds the value numbered `id`.
pub type Pair = (Key, ValueId);
