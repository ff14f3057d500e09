use serde::{Deserialize, Serialize};

/// Which scheme the prefetch planner (C3) uses to pick the next segment.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrefetchScheme {
    /// Same bitrate, next index.
    Simple,
    /// Highest bitrate on the ladder not exceeding the forecast throughput.
    #[default]
    Smart,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PrefetchConfig {
    pub scheme: PrefetchScheme,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            scheme: PrefetchScheme::Smart,
        }
    }
}
