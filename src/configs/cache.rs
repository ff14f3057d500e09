use serde::{Deserialize, Serialize};

/// Configuration for the priority cache (C2) and cache manager (C4).
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity_bytes: u64,
    pub cache_root: String,
    /// Priority assigned to client-driven accesses. Smaller = more important.
    pub fetch_priority: i32,
    /// Priority assigned to speculative prefetch accesses.
    pub prefetch_priority: i32,
    /// Poll interval, in milliseconds, used by `fetch()` while waiting on an
    /// in-flight prefetch for the same path.
    pub wait_time_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 10 * 1024 * 1024 * 1024,
            cache_root: "cache".to_string(),
            fetch_priority: 0,
            prefetch_priority: 10,
            wait_time_ms: 250,
        }
    }
}
