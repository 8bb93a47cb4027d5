//! # fixcache: convergence caches for fixpoint traversals
//!
//! **`fixcache`** decides, at each program point revisited by a path-sensitive
//! traversal of a control-flow graph, whether the incoming abstract state is
//! already covered by what was explored there before. When it is (a cache
//! **hit**), the traversal stops exploring that path; otherwise (a **miss**) it
//! keeps going and the cache records the state. This is what makes loops
//! converge.
//!
//! ## How it works
//!
//! Abstract values are never compared directly. A [`UniqueProjector`] maps
//! each value to a small canonical [`ValueId`], and a state becomes a sorted
//! list of `(Key, ValueId)` pairs (a [`StateHash`]). Caches then work on those
//! pairs:
//!
//! - **Subset caching** keeps the union of all pairs seen at a point. A state
//!   hits if all its pairs were seen ("bottom" semantics, for checkers), or if
//!   no key became unconstrained ("top" semantics, for propagators).
//! - **Equality caching** keeps whole states and hits on an exact match.
//! - **Composition** runs many analyses in one traversal, AND-ing their
//!   caches or keying one cache by the whole tuple of their states.
//!
//! On back edges, caches **widen** the incoming state against their contents
//! before testing it, so that loops reach a fixpoint in a bounded number of
//! iterations.
//!
//! ## Basic Usage
//!
//! ```rust
//! use fixcache::cache::{CacheConfig, CacheStrategy};
//! use fixcache::state::AbstractState;
//! use fixcache::store::{KeyedStore, NullWiden};
//! use fixcache::types::Key;
//! use fixcache::unique::shared_registry;
//!
//! let registry = shared_registry::<&str>();
//! let mut state = KeyedStore::new("nullness", registry, NullWiden);
//! state.insert(Key::new(1), "null");
//!
//! let mut cache = state.create_empty_cache(&CacheConfig::default());
//! assert!(!cache.check_cache_hit(&mut state, false, true)); // first visit
//!
//! let mut again = state.clone();
//! assert!(cache.check_cache_hit(&mut again, false, false)); // covered
//!
//! again.insert(Key::new(1), "not-null");
//! assert!(!cache.check_cache_hit(&mut again, false, false)); // new fact
//! ```
//!
//! ## Core Components
//!
//! - **[`cache`]**: the [`CacheStrategy`][crate::cache::CacheStrategy] trait and its implementations.
//! - **[`state`]**: what an analysis state must provide to be cached.
//! - **[`store`]**: [`KeyedStore`][crate::store::KeyedStore], the usual shape of a subset-cached state.
//! - **[`unique`]**: value-to-id projectors, including the interning registry.
//!
//! [`UniqueProjector`]: crate::unique::UniqueProjector
//! [`ValueId`]: crate::types::ValueId
//! [`StateHash`]: crate::pairs::StateHash

pub mod cache;
pub mod debug;
pub mod error;
pub mod pairs;
pub mod set_state;
pub mod state;
pub mod store;
pub mod types;
pub mod unique;
