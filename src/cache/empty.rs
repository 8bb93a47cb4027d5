//! Cache that never prevents a hit.
//!
//! Analyses with no caching of their own still get a cache, so composition
//! never has to special-case a missing one. On its own the empty cache stops
//! every path at the second visit of a point; inside a [`ComposedCache`] it is
//! neutral for the AND.
//!
//! [`ComposedCache`]: super::ComposedCache

use super::{CacheStats, CacheStrategy};
use crate::state::AbstractState;

#[derive(Debug, Default)]
pub struct EmptyCache {
    stats: CacheStats,
}

impl EmptyCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStrategy for EmptyCache {
    fn check_cache_hit(&mut self, _state: &mut dyn AbstractState, _widen: bool, first_time: bool) -> bool {
        let hit = !first_time;
        self.stats.record(hit);
        hit
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "empty"
    }
}
