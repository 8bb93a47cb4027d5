//! Equality cache.
//!
//! Hits iff a structurally equal state was stored before. States are bucketed
//! by [`EqState::state_hash`], which does not need to be unique: only the pair
//! (hash, [`EqState::is_equal`]) must identify a state.

use log::debug;
use rustc_hash::FxHashMap;

use super::{CacheStats, CacheStrategy};
use crate::debug::TraceConfig;
use crate::state::{AbstractState, EqState};

pub struct EqualityCache {
    /// Stored snapshots, in insertion order.
    states: Vec<Box<dyn EqState>>,
    /// Hash -> indices into `states`.
    buckets: FxHashMap<u64, Vec<usize>>,
    trace: TraceConfig,
    stats: CacheStats,
}

impl EqualityCache {
    pub fn new(trace: TraceConfig) -> Self {
        Self {
            states: Vec::new(),
            buckets: FxHashMap::default(),
            trace,
            stats: CacheStats::default(),
        }
    }

    /// Number of distinct states stored.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn contains(&self, hash: u64, state: &dyn EqState) -> bool {
        self.buckets
            .get(&hash)
            .is_some_and(|bucket| bucket.iter().any(|&i| self.states[i].is_equal(state)))
    }
}

impl std::fmt::Debug for EqualityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EqualityCache")
            .field("states", &self.states.len())
            .field("buckets", &self.buckets.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl CacheStrategy for EqualityCache {
    fn check_cache_hit(&mut self, state: &mut dyn AbstractState, widen: bool, _first_time: bool) -> bool {
        assert!(
            state.as_eq().is_some(),
            "State for {} used with equality cache but is not an equality state",
            state.name()
        );
        if self.trace.is_enabled() {
            debug!("[{}] Cache for: ({})\n{:?}", self.trace.label, state.name(), state);
        }
        let Some(eq) = state.as_eq_mut() else {
            unreachable!()
        };

        let hash = eq.state_hash();
        let hit = self.contains(hash, eq);
        if !hit {
            self.buckets.entry(hash).or_default().push(self.states.len());
            self.states.push(eq.clone_eq());
        }

        // Widen against everything stored, the state just added included.
        if widen {
            for stored in &self.states {
                eq.widen(stored.as_ref());
            }
        }

        self.stats.record(hit);
        self.trace.result(hit);
        hit
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "equality"
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use test_log::test;

    use super::*;
    use crate::cache::CacheConfig;
    use crate::state::SimpleState;

    #[test]
    fn test_equality_cache() {
        let mut cache = EqualityCache::new(TraceConfig::disabled());
        let mut a = SimpleState::new("lock", "locked");
        let mut b = SimpleState::new("lock", "unlocked");

        assert!(!cache.check_cache_hit(&mut a, false, true));
        assert!(cache.check_cache_hit(&mut a, false, false));
        assert!(!cache.check_cache_hit(&mut b, false, false));
        assert!(cache.check_cache_hit(&mut b, false, false));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().hits, 2);
    }

    /// Every value hashes the same, to exercise bucket collisions.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Colliding(u32);

    impl EqState for Colliding {
        fn state_hash(&self) -> u64 {
            7
        }
        fn is_equal(&self, other: &dyn EqState) -> bool {
            other.as_any().downcast_ref::<Self>() == Some(self)
        }
        fn widen(&mut self, other: &dyn EqState) {
            if let Some(o) = other.as_any().downcast_ref::<Self>() {
                self.0 = self.0.max(o.0);
            }
        }
        fn clone_eq(&self) -> Box<dyn EqState> {
            Box::new(self.clone())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl AbstractState for Colliding {
        fn name(&self) -> &str {
            "colliding"
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

    #[test]
    fn test_hash_collisions_compare_structurally() {
        let mut cache = EqualityCache::new(TraceConfig::disabled());
        assert!(!cache.check_cache_hit(&mut Colliding(1), false, true));
        assert!(!cache.check_cache_hit(&mut Colliding(2), false, false));
        assert!(cache.check_cache_hit(&mut Colliding(1), false, false));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_widen_after_check() {
        let mut cache = EqualityCache::new(TraceConfig::disabled());
        cache.check_cache_hit(&mut Colliding(5), false, true);

        // The check sees the unwidened state: miss, and 3 is stored.
        let mut s = Colliding(3);
        assert!(!cache.check_cache_hit(&mut s, true, false));
        assert_eq!(s, Colliding(5));
        assert_eq!(cache.len(), 2);

        // Without the flag, nothing is widened.
        let mut t = Colliding(4);
        cache.check_cache_hit(&mut t, false, false);
        assert_eq!(t, Colliding(4));
    }

    #[test]
    #[should_panic(expected = "is not an equality state")]
    fn test_rejects_non_equality_state() {
        let mut cache = EqualityCache::new(TraceConfig::disabled());
        let mut s = crate::state::EmptyState::new("none");
        cache.check_cache_hit(&mut s, false, false);
    }
}
