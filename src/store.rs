//! Keyed stores: the common shape of a subset-cached analysis state.
//!
//! A [`KeyedStore`] maps each tracked location to an abstract value. Values are
//! projected to ids through a [`UniqueProjector`] for hashing, and widened
//! against cached values through a [`Widener`].
//!
//! ```text
//! store:   { k1 -> [0, 3], k2 -> [1, 1] }
//! hash:    [(k1, #5), (k2, #2)]          // ids from the projector
//! widen:   k1 with cached [0, 4] -> [0, +inf]
//! ```

use std::any::Any;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use log::warn;

use crate::cache::{CacheConfig, CacheStrategy, SubsetCache};
use crate::error::RegistryError;
use crate::pairs::{CachePairSet, StateHash};
use crate::state::{AbstractState, SubsetState};
use crate::types::{Key, ValueId};
use crate::unique::UniqueProjector;

/// Combines a value with a cached value for the same key on back edges.
///
/// The combination must be monotone in the abstract domain's order.
pub trait Widener<V> {
    /// Does [`widen`][Widener::widen] do anything? Stores skip widening
    /// entirely when this is `false`.
    fn widens(&self) -> bool {
        true
    }

    /// Widens `current` with `cached`. Returns `false` if the key should be
    /// dropped from the store (its value became top).
    fn widen(&self, key: Key, current: &mut V, cached: &V) -> bool;
}

/// Widener for analyses that do not widen.
#[derive(Debug, Copy, Clone, Default)]
pub struct NullWiden;

impl<V> Widener<V> for NullWiden {
    fn widens(&self) -> bool {
        false
    }

    fn widen(&self, _key: Key, _current: &mut V, _cached: &V) -> bool {
        true
    }
}

/// Widener from a plain function or closure.
#[derive(Copy, Clone)]
pub struct FnWiden<F>(pub F);

impl<F> fmt::Debug for FnWiden<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnWiden")
    }
}

impl<V, F> Widener<V> for FnWiden<F>
where
    F: Fn(Key, &mut V, &V) -> bool,
{
    fn widen(&self, key: Key, current: &mut V, cached: &V) -> bool {
        (self.0)(key, current, cached)
    }
}

/// Ordered map from keys to abstract values, cached by subset caching.
#[derive(Clone)]
pub struct KeyedStore<V, U, W = NullWiden> {
    name: String,
    values: BTreeMap<Key, V>,
    uniq: U,
    widener: W,
    /// Overrides the traversal's configuration when set.
    novalue_is_bottom: Option<bool>,
    slice: Option<Vec<Key>>,
}

impl<V, U, W> KeyedStore<V, U, W> {
    pub fn new(name: impl Into<String>, uniq: U, widener: W) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
            uniq,
            widener,
            novalue_is_bottom: None,
            slice: None,
        }
    }

    /// Forces checker (`true`) or propagator (`false`) semantics on this
    /// store's caches, whatever the traversal's configuration says.
    pub fn with_novalue_is_bottom(mut self, novalue_is_bottom: bool) -> Self {
        self.novalue_is_bottom = Some(novalue_is_bottom);
        self
    }

    /// Keys whose values should also be cached by (slice) equality.
    pub fn with_slice_keys(mut self, keys: Vec<Key>) -> Self {
        self.slice = Some(keys);
        self
    }

    pub fn insert(&mut self, key: Key, value: V) -> Option<V> {
        self.values.insert(key, value)
    }

    pub fn get(&self, key: Key) -> Option<&V> {
        self.values.get(&key)
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut V> {
        self.values.get_mut(&key)
    }

    pub fn remove(&mut self, key: Key) -> Option<V> {
        self.values.remove(&key)
    }

    pub fn contains_key(&self, key: Key) -> bool {
        self.values.contains_key(&key)
    }

    /// Removes every entry not satisfying `f`.
    pub fn retain(&mut self, f: impl FnMut(&Key, &mut V) -> bool) {
        self.values.retain(f);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Key, V> {
        self.values.iter()
    }

    pub fn projector(&self) -> &U {
        &self.uniq
    }
}

impl<V, U, W> KeyedStore<V, U, W>
where
    U: UniqueProjector<V>,
{
    /// Whether `key` holds a value equal to `value`, as the projector sees it.
    pub fn has(&self, key: Key, value: &V) -> bool {
        self.values.get(&key).is_some_and(|v| self.uniq.equals(v, value))
    }
}

impl<V: fmt::Debug, U, W> fmt::Debug for KeyedStore<V, U, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "STORE ({}):", self.name)?;
        for (k, v) in &self.values {
            writeln!(f, "  {} -> {:?}", k, v)?;
        }
        write!(f, "END STORE")
    }
}

impl<V, U, W> SubsetState for KeyedStore<V, U, W>
where
    V: fmt::Debug,
    U: UniqueProjector<V>,
    W: Widener<V>,
{
    fn compute_hash(&self, hash: &mut StateHash) -> Result<(), RegistryError> {
        for (&key, value) in &self.values {
            hash.push(key, self.uniq.get_unique_id(value)?);
        }
        Ok(())
    }

    fn widens(&self) -> bool {
        self.widener.widens()
    }

    fn widen(&mut self, cache: &CachePairSet) {
        if cache.is_empty() {
            return;
        }
        let Self {
            values, uniq, widener, ..
        } = self;
        values.retain(|&key, current| {
            for &(_, id) in cache.values_with_key(key) {
                match uniq.get_from_id(id) {
                    Ok(cached) => {
                        if !widener.widen(key, current, &cached) {
                            return false;
                        }
                    }
                    Err(e) => warn!("skipping cached value while widening {}: {}", key, e),
                }
            }
            true
        });
    }

    fn value_at_id_string(&self, id: ValueId) -> String {
        match self.uniq.get_from_id(id) {
            Ok(v) => format!("{:?}", v),
            Err(_) => format!("<{}>", id),
        }
    }

    fn slice_keys(&self) -> Option<Vec<Key>> {
        self.slice.clone()
    }
}

impl<V, U, W> AbstractState for KeyedStore<V, U, W>
where
    V: Clone + fmt::Debug + 'static,
    U: UniqueProjector<V> + Clone + 'static,
    W: Widener<V> + Clone + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn clone_state(&self) -> Box<dyn AbstractState> {
        Box::new(self.clone())
    }

    fn create_empty_cache(&self, config: &CacheConfig) -> Box<dyn CacheStrategy> {
        let config = match self.novalue_is_bottom {
            Some(b) => config.with_novalue_is_bottom(b),
            None => *config,
        };
        Box::new(SubsetCache::new(config))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_subset(&self) -> Option<&dyn SubsetState> {
        Some(self)
    }

    fn as_subset_mut(&mut self) -> Option<&mut dyn SubsetState> {
        Some(self)
    }
}
