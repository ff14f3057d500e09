use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Configuration for MPD manifest handling: which paths are eligible for
/// origin import, and where manifests and the persisted index live on disk.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MpdConfig {
    pub source_list: HashSet<String>,
    pub mpd_root: String,
    pub index_path: String,
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            source_list: HashSet::new(),
            mpd_root: "mpd".to_string(),
            index_path: "mpd_index.json".to_string(),
        }
    }
}
