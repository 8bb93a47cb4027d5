//! Debug utilities for inspecting cache contents.
//!
//! Caches take a [`TraceConfig`] at construction instead of consulting a global
//! flag. When tracing is enabled, every `check_cache_hit` dumps what the cache
//! holds and the state being checked through `log::debug!`, and ends with a
//! `result: HIT` / `result: MISS` line.

use std::fmt::Write;

use crate::state::SubsetState;
use crate::types::{Key, Pair};

/// Per-cache tracing switch.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TraceConfig {
    pub enabled: bool,
    /// Printed in every trace line, to tell caches apart.
    pub label: &'static str,
}

impl TraceConfig {
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            label: "",
        }
    }

    pub const fn enabled(label: &'static str) -> Self {
        Self { enabled: true, label }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && log::log_enabled!(log::Level::Debug)
    }

    pub(crate) fn result(&self, hit: bool) {
        if self.is_enabled() {
            log::debug!("[{}] result: {}", self.label, if hit { "HIT" } else { "MISS" });
        }
    }
}

/// Renders pairs grouped by key, with values resolved through `state`.
///
/// Format: `k1 -> {[0, 1], [0, 2]}` one key per line.
pub fn render_pairs<'a, I>(state: &dyn SubsetState, pairs: I) -> String
where
    I: IntoIterator<Item = &'a Pair>,
{
    let mut result = String::new();
    let mut current: Option<Key> = None;
    for &(key, id) in pairs {
        if current != Some(key) {
            if current.is_some() {
                result.push_str("}\n");
            }
            let _ = write!(&mut result, "  {} -> {{", key);
            current = Some(key);
        } else {
            result.push_str(", ");
        }
        result.push_str(&state.value_at_id_string(id));
    }
    if current.is_some() {
        result.push_str("}\n");
    }
    result
}
