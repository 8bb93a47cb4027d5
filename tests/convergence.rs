use std::rc::Rc;

use fixcache::cache::subset::check_cache_hit;
use fixcache::cache::{CacheConfig, CacheStrategy, ComposedCache, SubsetCache};
use fixcache::error::RegistryError;
use fixcache::pairs::{CachePairSet, EqualityCacheSet, StateHash};
use fixcache::set_state::{SetPolicy, SetState};
use fixcache::state::{AbstractState, ComposedState, SimpleState, SubsetState};
use fixcache::store::{FnWiden, KeyedStore, NullWiden};
use fixcache::types::{Key, Pair, ValueId};
use fixcache::unique::{shared_registry, InternRegistry, SharedRegistry, UniqueProjector};
use test_log::test;

const A: Key = Key::new(1);
const B: Key = Key::new(2);
const I: Key = Key::new(10);

fn p(k: Key, v: u32) -> Pair {
    (k, ValueId::new(v))
}

fn hash(pairs: &[Pair]) -> StateHash {
    pairs.iter().copied().collect()
}

fn set(pairs: &[Pair]) -> CachePairSet {
    pairs.iter().copied().collect()
}

type Interval = (i64, i64);
type WidenFn = fn(Key, &mut Interval, &Interval) -> bool;
type IntervalStore = KeyedStore<Interval, SharedRegistry<Interval>, FnWiden<WidenFn>>;

fn widen_interval(_key: Key, current: &mut Interval, cached: &Interval) -> bool {
    current.0 = if current.0 < cached.0 { i64::MIN } else { cached.0 };
    current.1 = if current.1 > cached.1 { i64::MAX } else { cached.1 };
    *current != (i64::MIN, i64::MAX)
}

fn interval_store(reg: &SharedRegistry<Interval>) -> IntervalStore {
    KeyedStore::new("range", Rc::clone(reg), FnWiden(widen_interval as WidenFn))
}

fn increment(store: &mut IntervalStore) {
    if let Some(v) = store.get_mut(I) {
        *v = (v.0.saturating_add(1), v.1.saturating_add(1));
    }
}

/// Drives `state` around a single loop: the head is checked with
/// `first_time` on entry and with `widen` on every back edge, and `body` runs
/// until the head hits. Returns the number of iterations of the body.
fn run_loop<S, F>(cache: &mut dyn CacheStrategy, state: &mut S, max_iters: usize, mut body: F) -> Option<usize>
where
    S: AbstractState + 'static,
    F: FnMut(&mut S),
{
    if cache.check_cache_hit(state, false, true) {
        panic!("first visit must be a miss");
    }
    for iter in 0..max_iters {
        body(state);
        if cache.check_cache_hit(state, true, false) {
            return Some(iter + 1);
        }
    }
    None
}

#[test]
fn bootstrap_seeds_exactly() {
    let mut cache = CachePairSet::new();
    let mut eq = EqualityCacheSet::new();
    assert!(!check_cache_hit(&hash(&[p(A, 1), p(B, 2)]), 0, &mut cache, &mut eq, true, true));
    assert_eq!(cache, set(&[p(A, 1), p(B, 2)]));
}

#[test]
fn subset_hit_leaves_cache_unchanged() {
    let mut cache = set(&[p(A, 1), p(B, 2)]);
    let mut eq = EqualityCacheSet::new();
    assert!(check_cache_hit(&hash(&[p(A, 1)]), 0, &mut cache, &mut eq, false, true));
    assert_eq!(cache, set(&[p(A, 1), p(B, 2)]));
}

#[test]
fn novel_value_misses_and_is_recorded() {
    let mut cache = set(&[p(A, 1)]);
    let mut eq = EqualityCacheSet::new();
    assert!(!check_cache_hit(&hash(&[p(A, 2)]), 0, &mut cache, &mut eq, false, true));
    assert_eq!(cache, set(&[p(A, 1), p(A, 2)]));
}

#[test]
fn top_mode_missing_key_misses() {
    let mut cache = set(&[p(A, 1)]);
    let mut eq = EqualityCacheSet::new();
    assert!(!check_cache_hit(&hash(&[]), 0, &mut cache, &mut eq, false, false));
    assert_eq!(cache.values_with_key(A).count(), 0);
}

#[test]
fn bottom_mode_never_shrinks() {
    let mut cache = CachePairSet::new();
    let mut eq = EqualityCacheSet::new();
    let mut last = 0;
    for round in 0..50u32 {
        let state = hash(&[p(A, round % 7), p(Key::new(round % 5), round % 3)]);
        check_cache_hit(&state, 0, &mut cache, &mut eq, round == 0, true);
        assert!(cache.len() >= last);
        last = cache.len();
    }
}

#[test]
fn equality_collapses_into_subset() {
    let reg = shared_registry::<&'static str>();
    let config = CacheConfig::default().with_equality_caching_threshold(2);
    let mut cache = SubsetCache::subset(config);

    let store = |a: &'static str, b: &'static str| {
        let mut s = KeyedStore::new("nullness", Rc::clone(&reg), NullWiden);
        s.insert(A, a);
        s.insert(B, b);
        s
    };

    assert!(!cache.check_cache_hit(&mut store("null", "null"), false, true));
    assert!(cache.check_cache_hit(&mut store("null", "null"), false, false));
    assert!(!cache.check_cache_hit(&mut store("not-null", "null"), false, false));
    assert_eq!(cache.signatures().len(), 2);

    // The pair set is the union of both stored signatures.
    let ids = |v| reg.get_unique_id(&v).unwrap();
    let expected = set(&[(A, ids("null")), (A, ids("not-null")), (B, ids("null"))]);
    assert_eq!(cache.pairs(), &expected);

    // Subset semantics: a never-seen combination of seen values hits...
    assert!(cache.check_cache_hit(&mut store("not-null", "null"), false, false));
    // ...and a genuinely new value misses without growing the signatures.
    assert!(!cache.check_cache_hit(&mut store("null", "not-null"), false, false));
    assert_eq!(cache.signatures().len(), 2);
    assert!(cache.check_cache_hit(&mut store("null", "not-null"), false, false));
}

#[test]
fn and_composition_consults_every_sub_cache() {
    let reg = shared_registry::<&'static str>();
    let composed = |a: &'static str, b: &'static str| {
        let mut first = KeyedStore::new("first", Rc::clone(&reg), NullWiden);
        first.insert(A, a);
        let mut second = KeyedStore::new("second", Rc::clone(&reg), NullWiden);
        second.insert(A, b);
        ComposedState::new("both", vec![Box::new(first) as Box<dyn AbstractState>, Box::new(second)])
    };

    let config = CacheConfig::default();
    let init = composed("x", "x");
    let mut cache = ComposedCache::new(init.states().iter().map(|s| s.create_empty_cache(&config)).collect());
    assert!(!cache.check_cache_hit(&mut composed("x", "x"), false, true));

    // Sub-cache 0 hits, sub-cache 1 misses.
    assert!(!cache.check_cache_hit(&mut composed("x", "y"), false, false));
    assert_eq!(cache.get_cache_component(0).stats().calls, 2);
    assert_eq!(cache.get_cache_component(1).stats().calls, 2);
    assert_eq!(cache.get_cache_component(0).stats().hits, 1);
    assert_eq!(cache.get_cache_component(1).stats().misses, 2);
}

#[test]
fn counter_loop_converges_with_widening() {
    let reg = shared_registry();
    let mut state = interval_store(&reg);
    state.insert(I, (0, 0));
    let mut cache = state.create_empty_cache(&CacheConfig::default());

    let iters = run_loop(cache.as_mut(), &mut state, 10, increment);
    assert_eq!(iters, Some(2));
    assert_eq!(state.get(I), Some(&(0, i64::MAX)));
}

#[test]
fn counter_loop_without_widening_does_not_converge() {
    let reg = shared_registry();
    let mut state = KeyedStore::new("range", Rc::clone(&reg), NullWiden);
    state.insert(I, (0i64, 0i64));
    let mut cache = state.create_empty_cache(&CacheConfig::default());

    let iters = run_loop(cache.as_mut(), &mut state, 20, |s| {
        if let Some(v) = s.get_mut(I) {
            v.0 += 1;
            v.1 += 1;
        }
    });
    assert_eq!(iters, None);
}

#[test]
fn composed_loop_converges_when_all_analyses_do() {
    let reg = shared_registry();
    let mut range = interval_store(&reg);
    range.insert(I, (0, 0));
    let mut locks = SetState::new("locks", SetPolicy::ContinueIfNewObject, "held locks");
    locks.insert("m");
    let mut state = ComposedState::new(
        "all",
        vec![
            Box::new(range) as Box<dyn AbstractState>,
            Box::new(locks),
            Box::new(SimpleState::new("mode", 0u8)),
        ],
    );
    let mut cache = state.create_empty_cache(&CacheConfig::default());

    let iters = run_loop(cache.as_mut(), &mut state, 10, |s| {
        let range = s.get_nth_state_mut(0).as_any_mut().downcast_mut::<IntervalStore>().unwrap();
        increment(range);
        // The mode toggles once, then stays.
        let mode = s.get_nth_state_mut(2).as_any_mut().downcast_mut::<SimpleState<u8>>().unwrap();
        mode.value = 1;
    });
    assert_eq!(iters, Some(2));
    assert_eq!(cache.stats().calls, 3);
}

#[test]
fn superset_loop_drops_unbounded_keys() {
    let reg = shared_registry();
    let mut state = interval_store(&reg).with_novalue_is_bottom(false);
    state.insert(I, (0, 0));
    state.insert(A, (5, 5));
    let mut cache = state.create_empty_cache(&CacheConfig::default());
    assert_eq!(cache.name(), "superset");

    let iters = run_loop(cache.as_mut(), &mut state, 10, |s| {
        if let Some(v) = s.get_mut(I) {
            *v = (v.0 - 1, v.1 + 1);
        }
    });
    assert_eq!(iters, Some(2));
    assert!(!state.contains_key(I));
    assert_eq!(state.get(A), Some(&(5, 5)));
}

#[test]
fn registry_failure_is_a_sound_miss() {
    let reg: SharedRegistry<u32> = Rc::new(std::cell::RefCell::new(InternRegistry::with_limit(2)));
    let mut cache = SubsetCache::subset(CacheConfig::default());

    let mut s = KeyedStore::new("ids", Rc::clone(&reg), NullWiden);
    s.insert(A, 1);
    s.insert(B, 2);
    assert!(!cache.check_cache_hit(&mut s, false, true));
    assert!(cache.check_cache_hit(&mut s, false, false));

    // The registry is full: the state cannot be hashed.
    let mut t = s.clone();
    t.insert(B, 3);
    let mut scratch = StateHash::new();
    assert_eq!(t.compute_hash(&mut scratch), Err(RegistryError::CapacityExceeded { limit: 2 }));
    assert!(!cache.check_cache_hit(&mut t, false, false));
    assert_eq!(cache.pairs().len(), 2);
}

#[test]
fn swept_ids_cost_a_miss_not_a_wrong_hit() {
    let reg = shared_registry::<&'static str>();
    let mut cache = SubsetCache::subset(CacheConfig::default());

    let mut s = KeyedStore::new("nullness", Rc::clone(&reg), NullWiden);
    s.insert(A, "null");
    cache.check_cache_hit(&mut s, false, true);
    let old = reg.get_unique_id(&"null").unwrap();

    reg.borrow_mut().release(old).unwrap();
    assert_eq!(reg.borrow_mut().sweep(), 1);

    // Same value, fresh id: conservatively a miss.
    assert!(!cache.check_cache_hit(&mut s, false, false));
    assert_ne!(reg.get_unique_id(&"null").unwrap(), old);
    assert!(cache.check_cache_hit(&mut s, false, false));
}
