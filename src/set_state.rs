//! States that are plain sets of objects, with their own cache.
//!
//! Two caching policies:
//!
//! - [`SetPolicy::ContinueIfNewObject`]: the cache grows with every object
//!   seen, and a state with an object never seen before is a miss.
//! - [`SetPolicy::ContinueIfObjectMissing`]: the cache keeps only the objects
//!   present in every state so far, and a state lacking one of them is a miss.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::{self, Debug};

use log::{debug, trace};

use crate::cache::{CacheConfig, CacheStats, CacheStrategy};
use crate::debug::TraceConfig;
use crate::state::AbstractState;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SetPolicy {
    /// Grow-only cache.
    ContinueIfNewObject,
    /// Shrink-only cache.
    ContinueIfObjectMissing,
}

#[derive(Clone)]
pub struct SetState<T> {
    name: String,
    policy: SetPolicy,
    /// What the objects are, for diagnostics.
    object_desc: &'static str,
    pub objects: BTreeSet<T>,
}

impl<T: Ord> SetState<T> {
    pub fn new(name: impl Into<String>, policy: SetPolicy, object_desc: &'static str) -> Self {
        Self {
            name: name.into(),
            policy,
            object_desc,
            objects: BTreeSet::new(),
        }
    }

    pub fn policy(&self) -> SetPolicy {
        self.policy
    }

    pub fn insert(&mut self, object: T) -> bool {
        self.objects.insert(object)
    }

    pub fn remove(&mut self, object: &T) -> bool {
        self.objects.remove(object)
    }

    pub fn contains(&self, object: &T) -> bool {
        self.objects.contains(object)
    }
}

impl<T: Debug> Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} in state:", self.object_desc)?;
        for o in &self.objects {
            writeln!(f, "  {:?}", o)?;
        }
        Ok(())
    }
}

impl<T> AbstractState for SetState<T>
where
    T: Ord + Clone + Debug + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn clone_state(&self) -> Box<dyn AbstractState> {
        Box::new(self.clone())
    }

    fn create_empty_cache(&self, config: &CacheConfig) -> Box<dyn CacheStrategy> {
        Box::new(SetCache::<T>::new(self.policy, self.object_desc, config.trace))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Cache for a [`SetState`].
pub struct SetCache<T> {
    policy: SetPolicy,
    object_desc: &'static str,
    objects: BTreeSet<T>,
    trace: TraceConfig,
    stats: CacheStats,
}

impl<T: Ord> SetCache<T> {
    pub fn new(policy: SetPolicy, object_desc: &'static str, trace: TraceConfig) -> Self {
        Self {
            policy,
            object_desc,
            objects: BTreeSet::new(),
            trace,
            stats: CacheStats::default(),
        }
    }

    pub fn objects(&self) -> &BTreeSet<T> {
        &self.objects
    }
}

impl<T: Debug> Debug for SetCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetCache")
            .field("policy", &self.policy)
            .field(self.object_desc, &self.objects)
            .finish()
    }
}

impl<T> CacheStrategy for SetCache<T>
where
    T: Ord + Clone + Debug + 'static,
{
    fn check_cache_hit(&mut self, state: &mut dyn AbstractState, _widen: bool, first_time: bool) -> bool {
        let name = state.name().to_owned();
        let Some(state) = state.as_any_mut().downcast_mut::<SetState<T>>() else {
            panic!("State for {} used with a set cache but is not a matching set state", name);
        };

        if first_time {
            self.objects.extend(state.objects.iter().cloned());
            self.stats.record(false);
            return false;
        }

        if self.trace.is_enabled() {
            debug!(
                "[{}] Cache for {} ({}): {:?}\n{:?}",
                self.trace.label, self.object_desc, name, self.objects, state
            );
        }

        let mut hit = true;
        match self.policy {
            SetPolicy::ContinueIfNewObject => {
                for o in &state.objects {
                    if self.objects.insert(o.clone()) {
                        trace!("{:?} is not in cache, cache miss", o);
                        hit = false;
                    }
                }
            }
            SetPolicy::ContinueIfObjectMissing => {
                self.objects.retain(|o| {
                    let present = state.objects.contains(o);
                    if !present {
                        trace!("{:?} is not in current state, cache miss", o);
                        hit = false;
                    }
                    present
                });
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
        "set"
    }
}
