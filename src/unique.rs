//! Unique id projectors: turning values into small canonical integers.
//!
//! Subset caching never compares abstract values directly. Every value is
//! first projected to a [`ValueId`] such that equal values get equal ids; the
//! caches then only deal with `(Key, ValueId)` pairs.
//!
//! Three projectors are provided:
//!
//! | Projector | Equality | Reverse lookup | Use case |
//! |-----------|----------|----------------|----------|
//! | [`InternRegistry`] (via [`SharedRegistry`]) | Structural | Stored copy | Deep values (intervals, sets, ...) |
//! | [`IdentityProjector`] | Already unique | Cast back | Interned handles, enums |
//! | [`ConstProjector`] | Everything equal | `T::default()` | Facts irrelevant to caching |
//!
//! # Lifetime
//!
//! One registry lives for one analysis unit (typically one function). It is the
//! only structure shared between forked branches of a traversal, and it is
//! append-only: an id, once handed out, always names the same value until
//! [`InternRegistry::clear`] ends the unit.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::error::RegistryError;
use crate::types::ValueId;

/// Maps values to canonical ids and back.
pub trait UniqueProjector<T> {
    /// Returns the id of a previously seen equal value, or allocates a new one.
    fn get_unique_id(&self, value: &T) -> Result<ValueId, RegistryError>;

    /// Reverse lookup.
    fn get_from_id(&self, id: ValueId) -> Result<T, RegistryError>;

    /// Compares two values the way the projector does, without a lookup.
    fn equals(&self, a: &T, b: &T) -> bool;
}

struct Entry<T> {
    /// Canonical copy; `None` once swept.
    value: Option<T>,
    /// Outstanding references declared through `retain`/`release`.
    refs: u32,
}

/// Structural hash-and-count registry.
///
/// Values are deep-copied into registry-owned storage on first sight and
/// numbered in allocation order. Entries live in a plain `Vec` indexed by id
/// (ids are never reused), with a hash index on the side for lookup.
pub struct InternRegistry<T> {
    entries: Vec<Entry<T>>,
    index: FxHashMap<T, ValueId>,
    /// Maximum number of live values, if capped.
    limit: Option<usize>,
    live: usize,
}

impl<T> Default for InternRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InternRegistry<T> {
    /// Creates an uncapped registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
            limit: None,
            live: 0,
        }
    }

    /// Creates a registry refusing to hold more than `limit` live values.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Number of ids ever handed out (including swept ones).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of ids whose value is still stored.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Reference count of `id`, or `None` if it is unknown or swept.
    pub fn refs(&self, id: ValueId) -> Option<u32> {
        self.entry(id).ok().map(|e| e.refs)
    }

    fn entry(&self, id: ValueId) -> Result<&Entry<T>, RegistryError> {
        match self.entries.get(id.index() as usize) {
            Some(e) if e.value.is_some() => Ok(e),
            _ => Err(RegistryError::UnknownId(id)),
        }
    }

    fn entry_mut(&mut self, id: ValueId) -> Result<&mut Entry<T>, RegistryError> {
        match self.entries.get_mut(id.index() as usize) {
            Some(e) if e.value.is_some() => Ok(e),
            _ => Err(RegistryError::UnknownId(id)),
        }
    }

    /// Declares one more holder of `id`.
    pub fn retain(&mut self, id: ValueId) -> Result<(), RegistryError> {
        let entry = self.entry_mut(id)?;
        entry.refs += 1;
        Ok(())
    }

    /// Drops one holder of `id`. The value is only freed by [`sweep`][Self::sweep].
    pub fn release(&mut self, id: ValueId) -> Result<(), RegistryError> {
        let entry = self.entry_mut(id)?;
        entry.refs = entry.refs.saturating_sub(1);
        Ok(())
    }

    /// Forgets everything. Ends the analysis unit.
    pub fn clear(&mut self) {
        debug!("clearing unique registry ({} ids, {} live)", self.entries.len(), self.live);
        self.entries.clear();
        self.index.clear();
        self.live = 0;
    }
}

impl<T> InternRegistry<T>
where
    T: Clone + Eq + Hash,
{
    /// Returns the id of `value`, interning a copy if it is new.
    pub fn intern(&mut self, value: &T) -> Result<ValueId, RegistryError> {
        if let Some(&id) = self.index.get(value) {
            return Ok(id);
        }

        if let Some(limit) = self.limit {
            if self.live >= limit {
                return Err(RegistryError::CapacityExceeded { limit });
            }
        }

        let id = next_id(self.entries.len())?;
        self.entries.push(Entry {
            value: Some(value.clone()),
            refs: 1,
        });
        self.index.insert(value.clone(), id);
        self.live += 1;
        Ok(id)
    }

    /// Reverse lookup.
    pub fn lookup(&self, id: ValueId) -> Result<&T, RegistryError> {
        let entry = self.entry(id)?;
        entry.value.as_ref().ok_or(RegistryError::UnknownId(id))
    }

    /// Frees the values of all entries with no outstanding reference.
    ///
    /// Swept ids are never handed out again: an equal value seen later gets a
    /// fresh id. Caches still holding the old id then see a novel value, which
    /// costs a miss, never a wrong hit.
    ///
    /// Returns the number of freed entries.
    pub fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for entry in self.entries.iter_mut() {
            if entry.refs == 0 {
                if let Some(value) = entry.value.take() {
                    self.index.remove(&value);
                    freed += 1;
                }
            }
        }
        self.live -= freed;
        debug!("sweep: freed {} of {} ids, {} live", freed, self.entries.len(), self.live);
        freed
    }
}

/// The id for the entry at `index`. Ids stop short of `u32::MAX`.
fn next_id(index: usize) -> Result<ValueId, RegistryError> {
    match u32::try_from(index) {
        Ok(i) if i < u32::MAX => Ok(ValueId::new(i)),
        _ => Err(RegistryError::CapacityExceeded {
            limit: u32::MAX as usize,
        }),
    }
}

impl<T> fmt::Debug for InternRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternRegistry")
            .field("ids", &self.entries.len())
            .field("live", &self.live)
            .field("limit", &self.limit)
            .finish()
    }
}

/// A registry shared by every branch of one analysis unit.
pub type SharedRegistry<T> = Rc<RefCell<InternRegistry<T>>>;

/// Creates an empty [`SharedRegistry`].
pub fn shared_registry<T>() -> SharedRegistry<T> {
    Rc::new(RefCell::new(InternRegistry::new()))
}

impl<T> UniqueProjector<T> for SharedRegistry<T>
where
    T: Clone + Eq + Hash,
{
    fn get_unique_id(&self, value: &T) -> Result<ValueId, RegistryError> {
        self.borrow_mut().intern(value)
    }

    fn get_from_id(&self, id: ValueId) -> Result<T, RegistryError> {
        self.borrow().lookup(id).cloned()
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

/// Projector for values that already are unique small integers.
pub struct IdentityProjector<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> IdentityProjector<T> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl<T> Default for IdentityProjector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for IdentityProjector<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for IdentityProjector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityProjector")
    }
}

impl<T> UniqueProjector<T> for IdentityProjector<T>
where
    T: Copy + Eq + Into<u32> + From<u32>,
{
    fn get_unique_id(&self, value: &T) -> Result<ValueId, RegistryError> {
        Ok(ValueId::new((*value).into()))
    }

    fn get_from_id(&self, id: ValueId) -> Result<T, RegistryError> {
        Ok(T::from(id.index()))
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

/// Projector that considers all values equal.
pub struct ConstProjector<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> ConstProjector<T> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl<T> Default for ConstProjector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ConstProjector<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ConstProjector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConstProjector")
    }
}

impl<T> UniqueProjector<T> for ConstProjector<T>
where
    T: Default,
{
    fn get_unique_id(&self, _value: &T) -> Result<ValueId, RegistryError> {
        Ok(ValueId::MIN)
    }

    fn get_from_id(&self, _id: ValueId) -> Result<T, RegistryError> {
        Ok(T::default())
    }

    fn equals(&self, _a: &T, _b: &T) -> bool {
        true
    }
}
