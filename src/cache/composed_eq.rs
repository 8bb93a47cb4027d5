//! Equality cache over the whole tuple of a composed state.
//!
//! Unlike [`ComposedCache`], which hits when each sub-state is covered on its
//! own, this cache keeps the sub-state projections together: it hits only if
//! the exact tuple was stored before. This keeps correlations between analyses
//! (e.g. "the lock is held only when the flag is set") that an AND of separate
//! caches would lose.
//!
//! Sub-states must be subset states or empty states; empty ones are ignored.
//!
//! [`ComposedCache`]: super::ComposedCache

use std::collections::BTreeSet;

use log::{debug, warn};

use super::{CacheStats, CacheStrategy};
use crate::debug::{render_pairs, TraceConfig};
use crate::error::RegistryError;
use crate::pairs::{CachePairSet, StateHash};
use crate::state::{AbstractState, ComposedState, SubsetState};

/// One stored tuple: a projection per (non-empty) sub-state.
type CachedComposition = Vec<StateHash>;

/// Accumulated pair sets for the sub-states that widen.
#[derive(Debug)]
struct WidenInfo {
    /// Positions (among the non-empty sub-states) of those that widen.
    widening: Vec<usize>,
    /// Union of every stored projection, one per entry of `widening`.
    caches: Vec<CachePairSet>,
}

impl WidenInfo {
    fn new(subs: &[&mut dyn SubsetState], stored: &BTreeSet<CachedComposition>) -> Self {
        let widening: Vec<usize> = (0..subs.len()).filter(|&i| subs[i].widens()).collect();
        let mut info = Self {
            caches: vec![CachePairSet::new(); widening.len()],
            widening,
        };
        // Tuples stored before the first widen count too.
        for composition in stored {
            info.add(composition);
        }
        info
    }

    fn add(&mut self, composition: &CachedComposition) {
        for (&i, cache) in self.widening.iter().zip(&mut self.caches) {
            cache.extend_from(&composition[i]);
        }
    }

    fn widen(&self, subs: &mut [&mut dyn SubsetState]) {
        for (&i, cache) in self.widening.iter().zip(&self.caches) {
            subs[i].widen(cache);
        }
    }
}

#[derive(Debug)]
pub struct ComposedEqCache {
    stored: BTreeSet<CachedComposition>,
    /// Built on the first widening call.
    widen_info: Option<WidenInfo>,
    trace: TraceConfig,
    stats: CacheStats,
}

/// The subset sub-states of `state`, skipping empty ones.
fn decompose(state: &mut ComposedState) -> Vec<&mut dyn SubsetState> {
    let mut subs = Vec::with_capacity(state.len());
    for s in state.states_mut() {
        if s.as_subset().is_none() {
            if s.is_empty_state() {
                continue;
            }
            panic!("State for {} is not subset or empty", s.name());
        }
        let Some(sub) = s.as_subset_mut() else {
            unreachable!()
        };
        subs.push(sub);
    }
    subs
}

fn project(subs: &[&mut dyn SubsetState]) -> Result<CachedComposition, RegistryError> {
    subs.iter()
        .map(|sub| -> Result<StateHash, RegistryError> {
            let mut hash = StateHash::new();
            sub.compute_hash(&mut hash)?;
            if !hash.is_sorted() {
                hash.normalize();
            }
            Ok(hash)
        })
        .collect()
}

impl ComposedEqCache {
    pub fn new(trace: TraceConfig) -> Self {
        Self {
            stored: BTreeSet::new(),
            widen_info: None,
            trace,
            stats: CacheStats::default(),
        }
    }

    /// Number of distinct tuples stored.
    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    fn dump(&self, subs: &[&mut dyn SubsetState], names: &[String], lookup: &CachedComposition) {
        let label = self.trace.label;
        let write = |composition: &CachedComposition| {
            let mut out = String::new();
            for (i, sub) in subs.iter().enumerate() {
                out.push_str(&format!("State for {}\n", names[i]));
                out.push_str(&render_pairs(&**sub, &composition[i]));
            }
            out
        };
        debug!("[{}] Cached states:", label);
        for composition in &self.stored {
            debug!("[{}]\n{}", label, write(composition));
        }
        debug!("[{}] State being checked:\n{}", label, write(lookup));
    }
}

impl CacheStrategy for ComposedEqCache {
    fn check_cache_hit(&mut self, state: &mut dyn AbstractState, widen: bool, _first_time: bool) -> bool {
        let name = state.name().to_owned();
        let composed = match state.as_composed_mut() {
            Some(c) => c,
            None => panic!("State for {} used with composed equality cache but is not a composed state", name),
        };
        let names: Vec<String> = if self.trace.is_enabled() {
            composed
                .states()
                .iter()
                .filter(|s| !s.is_empty_state())
                .map(|s| s.name().to_owned())
                .collect()
        } else {
            Vec::new()
        };
        let mut subs = decompose(composed);

        if widen {
            let stored = &self.stored;
            let info = self.widen_info.get_or_insert_with(|| WidenInfo::new(&subs, stored));
            info.widen(&mut subs);
        }

        let lookup = match project(&subs) {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!("could not hash composed state {}, reporting a miss: {}", name, e);
                self.stats.record(false);
                self.trace.result(false);
                return false;
            }
        };

        if self.trace.is_enabled() {
            self.dump(&subs, &names, &lookup);
        }

        let hit = self.stored.contains(&lookup);
        if !hit {
            if let Some(info) = &mut self.widen_info {
                info.add(&lookup);
            }
            self.stored.insert(lookup);
        }

        self.stats.record(hit);
        self.trace.result(hit);
        hit
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "composed-equality"
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use test_log::test;

    use super::*;
    use crate::cache::{CacheConfig, SubsetCache};
    use crate::state::{EmptyState, SimpleState};
    use crate::types::{Key, ValueId};

    /// Single variable `k0` with a small integer value; widening jumps to the
    /// largest cached value.
    #[derive(Debug, Clone)]
    struct Counter {
        name: &'static str,
        value: u32,
        widens: bool,
    }

    impl Counter {
        fn boxed(name: &'static str, value: u32, widens: bool) -> Box<dyn AbstractState> {
            Box::new(Counter { name, value, widens })
        }
    }

    /// A counter holding this value cannot be hashed.
    const UNHASHABLE: u32 = u32::MAX;

    impl SubsetState for Counter {
        fn compute_hash(&self, hash: &mut StateHash) -> Result<(), RegistryError> {
            if self.value == UNHASHABLE {
                return Err(RegistryError::CapacityExceeded { limit: 0 });
            }
            hash.push(Key::new(0), ValueId::new(self.value));
            Ok(())
        }
        fn widens(&self) -> bool {
            self.widens
        }
        fn widen(&mut self, cache: &CachePairSet) {
            if let Some(&(_, top)) = cache.values_with_key(Key::new(0)).next_back() {
                self.value = self.value.max(top.index());
            }
        }
        fn value_at_id_string(&self, id: ValueId) -> String {
            id.index().to_string()
        }
    }

    impl AbstractState for Counter {
        fn name(&self) -> &str {
            self.name
        }
        fn clone_state(&self) -> Box<dyn AbstractState> {
            Box::new(self.clone())
        }
        fn create_empty_cache(&self, config: &CacheConfig) -> Box<dyn CacheStrategy> {
            Box::new(SubsetCache::new(*config))
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

    fn pair(a: u32, b: u32) -> ComposedState {
        ComposedState::with_equality(
            "pair",
            vec![Counter::boxed("a", a, false), EmptyState::new("e").clone_state(), Counter::boxed("b", b, false)],
        )
    }

    fn value(state: &ComposedState, i: usize) -> u32 {
        let mut s = state.get_nth_state(i).clone_state();
        s.as_any_mut().downcast_mut::<Counter>().map(|c| c.value).unwrap()
    }

    #[test]
    fn test_tuple_equality_keeps_correlation() {
        let mut cache = pair(0, 0).create_empty_cache(&CacheConfig::default());
        assert!(!cache.check_cache_hit(&mut pair(0, 1), false, true));
        assert!(!cache.check_cache_hit(&mut pair(1, 0), false, false));
        // Each component was seen, but never together: an AND cache would hit.
        assert!(!cache.check_cache_hit(&mut pair(1, 1), false, false));
        assert!(cache.check_cache_hit(&mut pair(0, 1), false, false));
        assert!(cache.check_cache_hit(&mut pair(1, 1), false, false));
        assert_eq!(cache.stats().misses, 3);
    }

    #[test]
    fn test_widen_info_built_lazily_from_stored_tuples() {
        let mut cache = ComposedEqCache::new(TraceConfig::disabled());
        let widening = |a, b| {
            ComposedState::with_equality("pair", vec![Counter::boxed("a", a, true), Counter::boxed("b", b, false)])
        };

        cache.check_cache_hit(&mut widening(4, 0), false, true);
        assert!(cache.widen_info.is_none());

        // First widen sees the tuple stored without widening: a goes 2 -> 4.
        let mut s = widening(2, 0);
        assert!(cache.check_cache_hit(&mut s, true, false));
        assert_eq!(value(&s, 0), 4);

        // b does not widen.
        let mut t = widening(1, 7);
        assert!(!cache.check_cache_hit(&mut t, true, false));
        assert_eq!(value(&t, 0), 4);
        assert_eq!(value(&t, 1), 7);

        // Misses extend the accumulated sets.
        let mut u = widening(9, 7);
        assert!(!cache.check_cache_hit(&mut u, false, false));
        let mut v = widening(0, 7);
        assert!(cache.check_cache_hit(&mut v, true, false));
        assert_eq!(value(&v, 0), 9);
    }

    #[test]
    fn test_hash_failure_is_a_miss() {
        let mut cache = ComposedEqCache::new(TraceConfig::disabled());
        assert!(!cache.check_cache_hit(&mut pair(0, 0), false, true));
        assert_eq!(cache.len(), 1);

        assert!(!cache.check_cache_hit(&mut pair(0, UNHASHABLE), false, false));
        assert!(!cache.check_cache_hit(&mut pair(0, UNHASHABLE), false, false));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().misses, 3);

        assert!(cache.check_cache_hit(&mut pair(0, 0), false, false));
    }

    #[test]
    #[should_panic(expected = "is not subset or empty")]
    fn test_rejects_equality_sub_state() {
        let mut cache = ComposedEqCache::new(TraceConfig::disabled());
        let mut s = ComposedState::with_equality("mixed", vec![Box::new(SimpleState::new("lock", 1)) as Box<dyn AbstractState>]);
        cache.check_cache_hit(&mut s, false, false);
    }
}
