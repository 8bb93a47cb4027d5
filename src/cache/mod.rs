//! Convergence caches for fixpoint traversals.
//!
//! At each program point revisited by the traversal, a cache decides whether
//! the incoming abstract state is already covered by what was explored there
//! before (a **hit**: the path can be cut) or not (a **miss**: keep exploring).
//! The cache records the state on a miss, so the next equivalent visit hits.
//!
//! | Implementation | Hit when | Precision | Use Case |
//! |----------------|----------|-----------|----------|
//! | [`EmptyCache`] | Always (after the first visit) | None | Analyses relying on their siblings' caches |
//! | [`EqualityCache`] | An equal state was seen | Exact | Small, finite state spaces |
//! | [`SubsetCache`] | Every fact was seen before (bottom) / no fact became unconstrained (top) | Per-key | Checkers and propagators (default) |
//! | [`ComposedCache`] | Every sub-cache hits | Per sub-analysis | Running many analyses in one traversal |
//! | [`ComposedEqCache`] | The tuple of sub-projections was seen | Exact per tuple | Correlated sub-analyses |
//!
//! # Protocol
//!
//! The traversal calls [`CacheStrategy::check_cache_hit`] once per (edge,
//! analysis) pair:
//!
//! - `first_time` is set on the first visit of the point. The result is
//!   ignored and the cache seeds itself with the state.
//! - `widen` is set on back edges. Caches widen the state against their
//!   contents **before** testing for a hit, on every flagged call.
//!
//! ```text
//! Uninitialized --first_time--> Seeded --any call--> Active
//! ```
//!
//! # Example
//!
//! ```ignore
//! use fixcache::cache::{CacheConfig, CacheStrategy};
//!
//! let config = CacheConfig::default().with_equality_caching_threshold(4);
//! let mut cache = state.create_empty_cache(&config);
//! cache.check_cache_hit(&mut state, false, true); // seed
//! if cache.check_cache_hit(&mut next, is_back_edge, false) {
//!     // converged: stop exploring this path
//! }
//! ```

mod composed;
mod composed_eq;
mod empty;
mod equality;
pub mod subset;

use std::fmt::Debug;

pub use composed::ComposedCache;
pub use composed_eq::ComposedEqCache;
pub use empty::EmptyCache;
pub use equality::EqualityCache;
pub use subset::SubsetCache;

use crate::debug::TraceConfig;
use crate::state::AbstractState;

/// Default for [`CacheConfig::equality_caching_threshold`]: pure subset caching.
pub const EQUALITY_CACHING_THRESHOLD_DEFAULT: usize = 0;

/// Default for [`CacheConfig::slice_equality_caching_threshold`]: 3*3*3*3,
/// enough for four nested loops.
pub const SLICE_EQUALITY_CACHING_THRESHOLD_DEFAULT: usize = 81;

/// Decides whether a state was already covered at one program point.
pub trait CacheStrategy: Debug {
    /// Checks `state` against the cache, recording it on a miss.
    ///
    /// Returns `true` on a hit. With `first_time` set the result must be
    /// treated as a miss.
    fn check_cache_hit(&mut self, state: &mut dyn AbstractState, widen: bool, first_time: bool) -> bool;

    /// Counters of past calls.
    fn stats(&self) -> CacheStats;

    /// Short name of the strategy, for diagnostics.
    fn name(&self) -> &'static str;
}

/// Per-cache call counters.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub calls: usize,
    pub hits: usize,
    pub misses: usize,
}

impl CacheStats {
    pub(crate) fn record(&mut self, hit: bool) {
        self.calls += 1;
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    /// Fraction of calls that hit, or 0 if there were none.
    pub fn hit_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.hits as f64 / self.calls as f64
        }
    }
}

impl std::ops::AddAssign for CacheStats {
    fn add_assign(&mut self, other: Self) {
        self.calls += other.calls;
        self.hits += other.hits;
        self.misses += other.misses;
    }
}

/// Configuration shared by the caches of one traversal.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CacheConfig {
    /// If `true`, the absence of a value for a key is "bottom" (no fact holds)
    /// and a new value is a miss: subset behavior, for checkers. Otherwise it
    /// is "top" and a key disappearing is a miss: superset behavior, for
    /// propagators.
    pub novalue_is_bottom: bool,
    /// If non-zero, use equality caching until this many distinct states were
    /// seen, then collapse into subset caching.
    pub equality_caching_threshold: usize,
    /// If non-zero (and `equality_caching_threshold` is 0), additionally use
    /// equality caching on the keys a state selects until this many distinct
    /// slices were seen.
    pub slice_equality_caching_threshold: usize,
    pub trace: TraceConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            novalue_is_bottom: true,
            equality_caching_threshold: EQUALITY_CACHING_THRESHOLD_DEFAULT,
            slice_equality_caching_threshold: SLICE_EQUALITY_CACHING_THRESHOLD_DEFAULT,
            trace: TraceConfig::disabled(),
        }
    }
}

impl CacheConfig {
    pub fn with_novalue_is_bottom(mut self, novalue_is_bottom: bool) -> Self {
        self.novalue_is_bottom = novalue_is_bottom;
        self
    }

    pub fn with_equality_caching_threshold(mut self, threshold: usize) -> Self {
        self.equality_caching_threshold = threshold;
        self
    }

    pub fn with_slice_equality_caching_threshold(mut self, threshold: usize) -> Self {
        self.slice_equality_caching_threshold = threshold;
        self
    }

    pub fn with_trace(mut self, trace: TraceConfig) -> Self {
        self.trace = trace;
        self
    }
}
