//! Subset (and superset) caching.
//!
//! A state is converted into a mapping from keys to value ids. The cache
//! remembers, for each key, every id that has been seen associated with it:
//! the union of all states seen at the program point.
//!
//! # Bottom mode (`novalue_is_bottom = true`)
//!
//! A missing key means "no fact holds". The state hits iff each of its pairs was
//! already in the cache; the cache only grows. This is the checker behavior.
//!
//! # Top mode (`novalue_is_bottom = false`)
//!
//! A missing key means "any value". The state and the cache are walked in key
//! order:
//!
//! ```text
//! cache key absent from state  -> key became unconstrained: drop it, MISS
//! state key absent from cache  -> already covered by the implicit top
//! key in both                  -> insert the state's value; MISS if new
//! ```
//!
//! # Equality hybrid
//!
//! With a non-zero `equality_caching_threshold`, whole signatures are compared
//! for equality until that many distinct ones were stored; then every stored
//! signature is unioned into the pair set and subset caching takes over. With a
//! zero threshold, a state may still select "interesting" keys that get
//! equality caching on their own, up to `slice_equality_caching_threshold`
//! distinct slices.

use log::{debug, trace, warn};

use super::{CacheConfig, CacheStats, CacheStrategy};
use crate::debug::render_pairs;
use crate::pairs::{CachePairSet, EqualityCacheSet, StateHash};
use crate::state::{AbstractState, SubsetState};
use crate::types::Key;

/// Checks whether `state` is already in `eq_cache`; if not, adds a copy.
///
/// Returns `true` on a hit.
pub fn check_insert_set(state: &StateHash, eq_cache: &mut EqualityCacheSet) -> bool {
    if eq_cache.contains(state) {
        return true;
    }
    eq_cache.insert(state.clone());
    false
}

/// The subset caching algorithm itself, on an already computed hash.
///
/// Returns `true` on a hit. With `first_time` set, `cache` is seeded with
/// `state` and the result is a miss, except while fewer than
/// `equality_caching_threshold` signatures are stored: equality caching then
/// runs first, so a signature already in `eq_cache` hits even on a first visit.
pub fn check_cache_hit(
    state: &StateHash,
    equality_caching_threshold: usize,
    cache: &mut CachePairSet,
    eq_cache: &mut EqualityCacheSet,
    first_time: bool,
    novalue_is_bottom: bool,
) -> bool {
    if eq_cache.len() < equality_caching_threshold {
        if check_insert_set(state, eq_cache) {
            return true;
        }
        if eq_cache.len() == equality_caching_threshold {
            // Reached the limit: collapse all the signatures into one set.
            debug!(
                "equality cache reached {} signatures, collapsing into subset cache",
                equality_caching_threshold
            );
            for signature in eq_cache.iter() {
                cache.extend_from(signature);
            }
        }
        return false;
    }

    if first_time {
        // Seed the cache. Otherwise in top mode the empty cache would mean
        // "top" for every key, and we would always hit.
        cache.extend_from(state);
        return false;
    }

    if novalue_is_bottom {
        // Insert everything, even after the first new pair.
        !cache.extend_from(state)
    } else {
        check_superset(state, cache)
    }
}

/// Top-mode walk. `state` must be sorted.
fn check_superset(state: &StateHash, cache: &mut CachePairSet) -> bool {
    let pairs = state.as_slice();
    let mut hit = true;
    let mut i = 0;
    let mut current = cache.first_key();

    while let Some(cache_key) = current {
        match pairs.get(i) {
            Some(&(state_key, _)) if state_key < cache_key => {
                trace!("Missing key {}", state_key);
                i += 1;
            }
            Some(&(state_key, _)) if state_key == cache_key => {
                trace!("Key {} present in both", state_key);
                while let Some(&(k, v)) = pairs.get(i) {
                    if k != state_key {
                        break;
                    }
                    if cache.insert((k, v)) {
                        trace!("Added value {} for {}, cache miss", v, k);
                        hit = false;
                    }
                    i += 1;
                }
                current = cache.next_key_after(cache_key);
            }
            _ => {
                // The cache's key is not in the state: the state is more
                // general. Remove the key to record that we have seen "top".
                trace!("Key {} is missing, cache miss", cache_key);
                let next = cache.next_key_after(cache_key);
                cache.remove_key(cache_key);
                current = next;
                hit = false;
            }
        }
    }

    hit
}

/// Slice equality caching on the keys in `slice`.
///
/// Returns `true` (no objection to a hit) when there is no slice or the
/// signature set is full.
pub fn check_slice(state: &StateHash, threshold: usize, eq_cache: &mut EqualityCacheSet, slice: Option<&[Key]>) -> bool {
    match slice {
        Some(keys) if eq_cache.len() < threshold => {
            let mut keys = keys.to_vec();
            keys.sort_unstable();
            keys.dedup();
            let sliced = state.restricted_to(&keys);
            check_insert_set(&sliced, eq_cache)
        }
        _ => true,
    }
}

/// Subset cache for one analysis at one program point.
#[derive(Debug)]
pub struct SubsetCache {
    config: CacheConfig,
    /// Union of all the states seen so far.
    pairs: CachePairSet,
    /// Signatures of single states seen at this point (equality modes).
    signatures: EqualityCacheSet,
    stats: CacheStats,
}

impl SubsetCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            pairs: CachePairSet::new(),
            signatures: EqualityCacheSet::new(),
            stats: CacheStats::default(),
        }
    }

    /// Cache with checker semantics: a missing value is bottom.
    pub fn subset(config: CacheConfig) -> Self {
        Self::new(config.with_novalue_is_bottom(true))
    }

    /// Cache with propagation semantics: a missing value is top.
    pub fn superset(config: CacheConfig) -> Self {
        Self::new(config.with_novalue_is_bottom(false))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn pairs(&self) -> &CachePairSet {
        &self.pairs
    }

    pub fn signatures(&self) -> &EqualityCacheSet {
        &self.signatures
    }

    fn uses_eq_cache(&self, has_slice: bool) -> bool {
        let n = self.signatures.len();
        n < self.config.equality_caching_threshold || (has_slice && n < self.config.slice_equality_caching_threshold)
    }

    fn dump(&self, state: &dyn SubsetState, use_eq_cache: bool, name: &str) {
        let label = self.config.trace.label;
        debug!("[{}] Cache for: ({})", label, name);
        if use_eq_cache {
            debug!("[{}] Eq cache: {} signatures", label, self.signatures.len());
            for signature in &self.signatures {
                debug!("[{}] -- cache --\n{}", label, render_pairs(state, signature));
            }
            debug!("[{}] -- end eq caches --", label);
        }
        if !use_eq_cache || self.config.equality_caching_threshold == 0 {
            debug!("[{}] pairs:\n{}", label, render_pairs(state, &self.pairs));
        }
    }
}

impl CacheStrategy for SubsetCache {
    fn check_cache_hit(&mut self, state: &mut dyn AbstractState, widen: bool, first_time: bool) -> bool {
        assert!(
            state.as_subset().is_some(),
            "State for {} used with subset cache but is not a subset state",
            state.name()
        );
        let trace = self.config.trace;
        if trace.is_enabled() {
            debug!("[{}] state: {:?}", trace.label, state);
        }
        let name = if trace.is_enabled() { state.name().to_owned() } else { String::new() };
        let Some(sub) = state.as_subset_mut() else {
            unreachable!()
        };

        let slice = sub.slice_keys();
        let use_eq_cache = self.uses_eq_cache(slice.is_some());
        if trace.is_enabled() {
            self.dump(sub, use_eq_cache, &name);
        }

        // Widen on every flagged call, hit or miss, so that a composed cache
        // can update all of its sub-caches in a single pass. Widen before the
        // check so that widening may help hit.
        if widen && sub.widens() {
            if use_eq_cache {
                for signature in &self.signatures {
                    sub.widen_with_hash(signature);
                }
            }
            if !use_eq_cache || self.config.equality_caching_threshold == 0 {
                sub.widen(&self.pairs);
            }
        }

        let mut hash = StateHash::new();
        if let Err(e) = sub.compute_hash(&mut hash) {
            warn!("could not hash state, reporting a miss: {}", e);
            self.stats.record(false);
            trace.result(false);
            return false;
        }
        if !hash.is_sorted() {
            hash.normalize();
        }

        let mut hit = check_cache_hit(
            &hash,
            self.config.equality_caching_threshold,
            &mut self.pairs,
            &mut self.signatures,
            first_time,
            self.config.novalue_is_bottom,
        );

        if self.config.equality_caching_threshold == 0 {
            // Populate the slice cache even if the previous check missed.
            let slice_hit = check_slice(
                &hash,
                self.config.slice_equality_caching_threshold,
                &mut self.signatures,
                slice.as_deref(),
            );
            hit = hit && slice_hit;
        }

        self.stats.record(hit);
        trace.result(hit);
        hit
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        if self.config.novalue_is_bottom {
            "subset"
        } else {
            "superset"
        }
    }
}
