use std::rc::Rc;

use clap::Parser;
use color_eyre::eyre::eyre;
use log::{debug, info};

use fixcache::cache::{CacheConfig, CacheStrategy, ComposedCache};
use fixcache::debug::TraceConfig;
use fixcache::set_state::{SetPolicy, SetState};
use fixcache::state::{AbstractState, ComposedState};
use fixcache::store::{FnWiden, KeyedStore, NullWiden};
use fixcache::types::Key;
use fixcache::unique::{shared_registry, SharedRegistry};

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of counters incremented by the loop body.
    #[arg(value_name = "INT", default_value = "3")]
    counters: u32,

    /// Use equality caching until this many distinct states were seen.
    #[clap(long, value_name = "INT", default_value = "0")]
    threshold: usize,

    /// Treat a missing value as top (propagation) instead of bottom.
    #[clap(long)]
    superset: bool,

    /// Give up after this many iterations.
    #[clap(long, value_name = "INT", default_value = "100")]
    max_iters: usize,

    /// Dump cache contents at every check (needs debug logging).
    #[clap(long)]
    trace: bool,
}

type Interval = (i64, i64);
type WidenFn = fn(Key, &mut Interval, &Interval) -> bool;
type RangeStore = KeyedStore<Interval, SharedRegistry<Interval>, FnWiden<WidenFn>>;
type NullnessStore = KeyedStore<&'static str, SharedRegistry<&'static str>, NullWiden>;

/// Interval widening: unstable bounds jump to infinity.
fn widen_interval(_key: Key, current: &mut Interval, cached: &Interval) -> bool {
    current.0 = if current.0 < cached.0 { i64::MIN } else { cached.0 };
    current.1 = if current.1 > cached.1 { i64::MAX } else { cached.1 };
    *current != (i64::MIN, i64::MAX)
}

fn fmt_interval(v: &Interval) -> String {
    let lo = if v.0 == i64::MIN { "-inf".to_string() } else { v.0.to_string() };
    let hi = if v.1 == i64::MAX { "+inf".to_string() } else { v.1.to_string() };
    format!("[{}, {}]", lo, hi)
}

/// One pass over the loop body.
fn body(state: &mut ComposedState, iter: usize) {
    if let Some(ranges) = state.get_nth_state_mut(0).as_any_mut().downcast_mut::<RangeStore>() {
        ranges.retain(|&k, v| {
            let step = k.index() as i64 + 1;
            *v = (v.0.saturating_add(step), v.1.saturating_add(step));
            true
        });
    }
    // p = (p == NULL) ? malloc() : p
    if let Some(nullness) = state.get_nth_state_mut(1).as_any_mut().downcast_mut::<NullnessStore>() {
        nullness.insert(Key::new(0), if iter % 2 == 0 { "not-null" } else { "null" });
    }
    // lock(m) / unlock(m) on alternate iterations
    if let Some(locks) = state.get_nth_state_mut(2).as_any_mut().downcast_mut::<SetState<&'static str>>() {
        if iter % 2 == 0 {
            locks.insert("m");
        } else {
            locks.remove(&"m");
        }
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        if args.trace {
            simplelog::LevelFilter::Trace
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    println!("args = {:?}", args);

    let trace = if args.trace {
        TraceConfig::enabled("loop-head")
    } else {
        TraceConfig::disabled()
    };
    let config = CacheConfig::default()
        .with_novalue_is_bottom(!args.superset)
        .with_equality_caching_threshold(args.threshold)
        .with_trace(trace);

    let intervals: SharedRegistry<Interval> = shared_registry();
    let values: SharedRegistry<&'static str> = shared_registry();

    let mut ranges = RangeStore::new("ranges", Rc::clone(&intervals), FnWiden(widen_interval as WidenFn));
    for k in 0..args.counters {
        ranges.insert(Key::new(k), (0, 0));
    }
    let mut nullness = NullnessStore::new("nullness", Rc::clone(&values), NullWiden);
    nullness.insert(Key::new(0), "null");
    let locks = SetState::<&'static str>::new("locks", SetPolicy::ContinueIfNewObject, "held locks");

    let mut state = ComposedState::new(
        "loop",
        vec![
            Box::new(ranges) as Box<dyn AbstractState>,
            Box::new(nullness),
            Box::new(locks),
        ],
    );
    let mut cache = ComposedCache::new(state.states().iter().map(|s| s.create_empty_cache(&config)).collect());

    // Loop entry.
    cache.check_cache_hit(&mut state, false, true);

    let mut converged = None;
    for iter in 0..args.max_iters {
        body(&mut state, iter);
        debug!("after iteration {}: {:?}", iter + 1, state);
        if cache.check_cache_hit(&mut state, true, false) {
            converged = Some(iter + 1);
            break;
        }
    }

    let iters = converged.ok_or_else(|| eyre!("no convergence after {} iterations", args.max_iters))?;
    info!("converged after {} iterations", iters);

    if let Some(ranges) = state.get_nth_state_mut(0).as_any_mut().downcast_mut::<RangeStore>() {
        for (k, v) in ranges.iter() {
            println!("{} in {}", k, fmt_interval(v));
        }
    }

    for (i, sub) in cache.caches().iter().enumerate() {
        let stats = sub.stats();
        println!(
            "{:>10} ({:>9}): calls={} hits={} misses={} hit_rate={:.2}",
            state.get_nth_state(i).name(),
            sub.name(),
            stats.calls,
            stats.hits,
            stats.misses,
            stats.hit_rate()
        );
    }
    println!(
        "intervals interned: {}, values interned: {}",
        intervals.borrow().len(),
        values.borrow().len()
    );

    Ok(())
}
