use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Configuration for the origin client (C1): the base content-server URL
/// and the keyword table used to route a path's title token to an origin
/// sub-path.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct OriginConfig {
    pub base_url: String,
    pub title_prefix_map: HashMap<String, String>,
}

impl OriginConfig {
    /// Resolves the origin prefix for a title token, falling back to `/` if
    /// the title is unknown (the origin will answer with its own 404).
    pub fn prefix_for(&self, title: &str) -> &str {
        self.title_prefix_map
            .get(title)
            .map(String::as_str)
            .unwrap_or("/")
    }
}
