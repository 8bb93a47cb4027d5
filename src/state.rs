//! Abstract state contracts.
//!
//! An [`AbstractState`] is whatever an analysis tracks at one CFG point. The
//! traversal forks it with [`clone_state`][AbstractState::clone_state] at every
//! branch (states are never shared mutably between paths) and asks the
//! state for a fresh cache per program point with
//! [`create_empty_cache`][AbstractState::create_empty_cache].
//!
//! What a cache needs from the state is expressed as capabilities:
//!
//! - [`SubsetState`]: projects into a [`StateHash`] and widens against a
//!   [`CachePairSet`]; used by [`SubsetCache`] and [`ComposedEqCache`].
//! - [`EqState`]: hashes to a `u64` and compares structurally; used by
//!   [`EqualityCache`].
//! - [`ComposedState`]: an index-aligned tuple of sub-states; used by
//!   [`ComposedCache`] and [`ComposedEqCache`].
//!
//! A cache handed a state lacking the capability it needs fails fast.
//!
//! [`SubsetCache`]: crate::cache::SubsetCache
//! [`ComposedEqCache`]: crate::cache::ComposedEqCache
//! [`EqualityCache`]: crate::cache::EqualityCache
//! [`ComposedCache`]: crate::cache::ComposedCache

use std::any::Any;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::cache::{CacheConfig, CacheStrategy, ComposedCache, ComposedEqCache, EmptyCache, EqualityCache};
use crate::error::RegistryError;
use crate::pairs::{CachePairSet, StateHash};
use crate::types::{Key, ValueId};

/// The state of one analysis at one program point.
pub trait AbstractState: Debug {
    /// Name of the analysis owning this state, for diagnostics.
    fn name(&self) -> &str;

    /// Deep copy, taken at every path fork.
    fn clone_state(&self) -> Box<dyn AbstractState>;

    /// Creates the cache this kind of state should be checked against.
    fn create_empty_cache(&self, config: &CacheConfig) -> Box<dyn CacheStrategy>;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn as_subset(&self) -> Option<&dyn SubsetState> {
        None
    }
    fn as_subset_mut(&mut self) -> Option<&mut dyn SubsetState> {
        None
    }

    fn as_eq(&self) -> Option<&dyn EqState> {
        None
    }
    fn as_eq_mut(&mut self) -> Option<&mut dyn EqState> {
        None
    }

    fn as_composed(&self) -> Option<&ComposedState> {
        None
    }
    fn as_composed_mut(&mut self) -> Option<&mut ComposedState> {
        None
    }

    /// Whether the state carries no information at all.
    fn is_empty_state(&self) -> bool {
        false
    }
}

/// A state that can be projected to `(Key, ValueId)` pairs for subset caching.
///
/// Turning values into ids unifies processing across analyses and keeps large
/// abstract values (intervals, sets) out of the caches.
pub trait SubsetState {
    /// Appends the projection of the state to `hash`, sorted by key.
    ///
    /// The projection must be deterministic: equal states give equal hashes.
    fn compute_hash(&self, hash: &mut StateHash) -> Result<(), RegistryError>;

    /// Does `widen` do anything at all?
    fn widens(&self) -> bool;

    /// Widens every value whose key appears in `cache` with the cached values
    /// for that key.
    ///
    /// The combination must be monotone in the abstract domain's order. This is
    /// a precondition; nothing checks it.
    fn widen(&mut self, cache: &CachePairSet);

    /// Widens against a single snapshot, as stored by equality caching.
    fn widen_with_hash(&mut self, hash: &StateHash) {
        let set = CachePairSet::from(hash);
        self.widen(&set);
    }

    /// Human-readable value behind `id`, for trace dumps.
    fn value_at_id_string(&self, id: ValueId) -> String;

    /// Keys the analysis wants cached precisely (slice equality caching).
    fn slice_keys(&self) -> Option<Vec<Key>> {
        None
    }
}

/// A state cached by structural equality.
pub trait EqState {
    /// Hash consistent with [`is_equal`][EqState::is_equal]. It does not need
    /// to be unique.
    fn state_hash(&self) -> u64;

    fn is_equal(&self, other: &dyn EqState) -> bool;

    /// Moves this state up the lattice using `other`. Only called after a back
    /// edge. Does nothing by default.
    fn widen(&mut self, _other: &dyn EqState) {}

    fn clone_eq(&self) -> Box<dyn EqState>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn AbstractState> {
    fn clone(&self) -> Self {
        self.clone_state()
    }
}

/// A state with no information. Composes as a neutral element.
#[derive(Debug, Clone)]
pub struct EmptyState {
    name: String,
}

impl EmptyState {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AbstractState for EmptyState {
    fn name(&self) -> &str {
        &self.name
    }

    fn clone_state(&self) -> Box<dyn AbstractState> {
        Box::new(self.clone())
    }

    fn create_empty_cache(&self, _config: &CacheConfig) -> Box<dyn CacheStrategy> {
        Box::new(EmptyCache::new())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn is_empty_state(&self) -> bool {
        true
    }
}

/// A single value that never takes part in caching.
#[derive(Debug, Clone)]
pub struct UncachedState<T> {
    name: String,
    pub value: T,
}

impl<T> UncachedState<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self { name: name.into(), value }
    }
}

impl<T> AbstractState for UncachedState<T>
where
    T: Clone + Debug + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn clone_state(&self) -> Box<dyn AbstractState> {
        Box::new(self.clone())
    }

    fn create_empty_cache(&self, _config: &CacheConfig) -> Box<dyn CacheStrategy> {
        Box::new(EmptyCache::new())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A single value cached by equality.
#[derive(Debug, Clone)]
pub struct SimpleState<T> {
    name: String,
    pub value: T,
}

impl<T> SimpleState<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self { name: name.into(), value }
    }
}

impl<T> EqState for SimpleState<T>
where
    T: Clone + Debug + Eq + Hash + 'static,
{
    fn state_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.value.hash(&mut hasher);
        hasher.finish()
    }

    fn is_equal(&self, other: &dyn EqState) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.value == self.value)
    }

    fn clone_eq(&self) -> Box<dyn EqState> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T> AbstractState for SimpleState<T>
where
    T: Clone + Debug + Eq + Hash + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn clone_state(&self) -> Box<dyn AbstractState> {
        Box::new(self.clone())
    }

    fn create_empty_cache(&self, config: &CacheConfig) -> Box<dyn CacheStrategy> {
        Box::new(EqualityCache::new(config.trace))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_eq(&self) -> Option<&dyn EqState> {
        Some(self)
    }
    fn as_eq_mut(&mut self) -> Option<&mut dyn EqState> {
        Some(self)
    }
}

/// How a [`ComposedState`] wants to be cached.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Composition {
    /// One cache per sub-state, hit iff all of them hit.
    And,
    /// One cache keyed by the whole tuple of sub-state projections.
    TupleEquality,
}

/// The composition of `n` states, index-aligned with the caches built for it.
///
/// The number and order of sub-states never change during a traversal.
pub struct ComposedState {
    name: String,
    states: Vec<Box<dyn AbstractState>>,
    composition: Composition,
}

impl ComposedState {
    /// Composition cached by AND-ing one cache per sub-state.
    pub fn new(name: impl Into<String>, states: Vec<Box<dyn AbstractState>>) -> Self {
        Self {
            name: name.into(),
            states,
            composition: Composition::And,
        }
    }

    /// Composition of subset (or empty) states cached by tuple equality.
    pub fn with_equality(name: impl Into<String>, states: Vec<Box<dyn AbstractState>>) -> Self {
        Self {
            name: name.into(),
            states,
            composition: Composition::TupleEquality,
        }
    }

    pub fn composition(&self) -> Composition {
        self.composition
    }

    /// Number of sub-states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Sub-state at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    pub fn get_nth_state(&self, i: usize) -> &dyn AbstractState {
        assert!(
            i < self.states.len(),
            "Trying to get a state at position '{}', which is out of bounds",
            i
        );
        self.states[i].as_ref()
    }

    pub fn get_nth_state_mut(&mut self, i: usize) -> &mut dyn AbstractState {
        assert!(
            i < self.states.len(),
            "Trying to get a state at position '{}', which is out of bounds",
            i
        );
        self.states[i].as_mut()
    }

    /// Replaces the sub-state at position `i`.
    pub fn set_nth_state(&mut self, i: usize, state: Box<dyn AbstractState>) {
        assert!(
            i < self.states.len(),
            "Trying to set a state at position '{}', which is out of bounds",
            i
        );
        self.states[i] = state;
    }

    /// Sub-state owned by the analysis called `name`.
    ///
    /// # Panics
    ///
    /// Panics if no sub-state has that name.
    pub fn get_named_state_mut(&mut self, name: &str) -> &mut dyn AbstractState {
        match self.states.iter_mut().find(|s| s.name() == name) {
            Some(s) => s.as_mut(),
            None => panic!("Trying to get a state for '{}' but it wasn't in the sub-states", name),
        }
    }

    pub fn states(&self) -> &[Box<dyn AbstractState>] {
        &self.states
    }

    pub fn states_mut(&mut self) -> &mut [Box<dyn AbstractState>] {
        &mut self.states
    }
}

impl Clone for ComposedState {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            states: self.states.iter().map(|s| s.clone_state()).collect(),
            composition: self.composition,
        }
    }
}

impl Debug for ComposedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[COMPOSED STATE] ({})", self.name)?;
        for (i, s) in self.states.iter().enumerate() {
            writeln!(f, "[COMPONENT {}] ({}) {:?}", i, s.name(), s)?;
        }
        write!(f, "[END]")
    }
}

impl AbstractState for ComposedState {
    fn name(&self) -> &str {
        &self.name
    }

    fn clone_state(&self) -> Box<dyn AbstractState> {
        Box::new(self.clone())
    }

    fn create_empty_cache(&self, config: &CacheConfig) -> Box<dyn CacheStrategy> {
        match self.composition {
            Composition::And => {
                let caches = self.states.iter().map(|s| s.create_empty_cache(config)).collect();
                Box::new(ComposedCache::new(caches))
            }
            Composition::TupleEquality => Box::new(ComposedEqCache::new(config.trace)),
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_composed(&self) -> Option<&ComposedState> {
        Some(self)
    }
    fn as_composed_mut(&mut self) -> Option<&mut ComposedState> {
        Some(self)
    }
}
