use crate::lua_vm::lua_limits::{DEFAULT_GC_MIN_THRESHOLD, DEFAULT_GC_PAUSE, MAX_CALL_DEPTH};

/// Limits and collector tuning for one VM instance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SafeOption {
    /// Maximum nesting of Lua and native calls before "stack overflow"
    pub max_call_depth: usize,
    /// Maximum memory limit in bytes (estimated, see `GC::total_bytes`)
    pub max_memory_limit: usize,
    /// Collector pause in percent: the next cycle starts when the heap has
    /// grown to `live * gc_pause / 100`
    pub gc_pause: usize,
    /// Never schedule a cycle below this many estimated bytes
    pub gc_min_threshold: usize,
}

impl Default for SafeOption {
    fn default() -> Self {
        Self {
            max_call_depth: MAX_CALL_DEPTH,
            max_memory_limit: usize::MAX,
            gc_pause: DEFAULT_GC_PAUSE,
            gc_min_threshold: DEFAULT_GC_MIN_THRESHOLD,
        }
    }
}
