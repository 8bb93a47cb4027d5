//! Cache for a [`ComposedState`]: one sub-cache per sub-state, AND-ed.
//!
//! Every sub-cache is consulted on every call, even after a miss was found, so
//! that each of them records the state (and widens it when asked).

use super::{CacheStats, CacheStrategy};
use crate::state::{AbstractState, ComposedState};

#[derive(Debug)]
pub struct ComposedCache {
    caches: Vec<Box<dyn CacheStrategy>>,
    stats: CacheStats,
}

impl ComposedCache {
    /// Composes `caches`, index-aligned with the sub-states they will check.
    pub fn new(caches: Vec<Box<dyn CacheStrategy>>) -> Self {
        Self {
            caches,
            stats: CacheStats::default(),
        }
    }

    /// The `i`-th sub-cache.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    pub fn get_cache_component(&self, i: usize) -> &dyn CacheStrategy {
        self.caches[i].as_ref()
    }

    pub fn caches(&self) -> &[Box<dyn CacheStrategy>] {
        &self.caches
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

impl CacheStrategy for ComposedCache {
    fn check_cache_hit(&mut self, state: &mut dyn AbstractState, widen: bool, first_time: bool) -> bool {
        let name = state.name().to_owned();
        let composed: &mut ComposedState = match state.as_composed_mut() {
            Some(c) => c,
            None => panic!("State for {} used with composed cache but is not a composed state", name),
        };
        assert_eq!(
            composed.len(),
            self.caches.len(),
            "Composed state {} has {} sub-states but its cache has {}",
            name,
            composed.len(),
            self.caches.len()
        );

        let mut hit = true;
        for (cache, sub) in self.caches.iter_mut().zip(composed.states_mut()) {
            if !cache.check_cache_hit(sub.as_mut(), widen, first_time) {
                hit = false;
            }
        }

        self.stats.record(hit);
        hit
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "composed"
    }
}
