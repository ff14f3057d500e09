pub mod parser;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::common::errors::CacheError;

/// Per-MPD metadata the cache needs: the bitrate ladder and the response
/// headers to replay on a warm hit (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpdDescriptor {
    pub bandwidth_list: Vec<u64>,
    pub http_headers: HashMap<String, String>,
}

impl MpdDescriptor {
    /// The highest bitrate on the ladder not exceeding `forecast`, or the
    /// lowest rung if `forecast` is below every rung (SMART scheme, §4.3).
    pub fn rung_for_forecast(&self, forecast: Option<f64>) -> Option<u64> {
        let lowest = self.bandwidth_list.iter().copied().min()?;
        let Some(forecast) = forecast else {
            return Some(lowest);
        };
        let forecast = forecast.max(0.0) as u64;
        self.bandwidth_list
            .iter()
            .copied()
            .filter(|&b| b <= forecast)
            .max()
            .or(Some(lowest))
    }
}

/// Process-wide, persisted map of known MPD paths to their descriptors.
/// Never evicted; rewritten to `index_path` after every addition (§3).
pub struct MpdIndex {
    entries: DashMap<String, MpdDescriptor>,
    index_path: PathBuf,
}

impl MpdIndex {
    /// Loads the index from `index_path` if it exists; otherwise starts
    /// empty (a cold cache, per the "MPD cold import" scenario).
    pub fn load(index_path: impl Into<PathBuf>) -> Self {
        let index_path = index_path.into();
        let entries = match std::fs::read_to_string(&index_path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, MpdDescriptor>>(&raw) {
                Ok(map) => {
                    info!(count = map.len(), "loaded MPD index from disk");
                    DashMap::from_iter(map)
                }
                Err(e) => {
                    warn!(error = %e, "MPD index file is not valid JSON; starting empty");
                    DashMap::new()
                }
            },
            Err(_) => {
                info!("no MPD index file found; starting empty");
                DashMap::new()
            }
        };
        Self {
            entries,
            index_path,
        }
    }

    pub fn get(&self, path: &str) -> Option<MpdDescriptor> {
        self.entries.get(path).map(|e| e.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Inserts or replaces a descriptor and rewrites the JSON index file.
    /// Persist failures are logged and otherwise ignored (§7,
    /// `IndexPersistFailure`): in-memory state remains authoritative.
    pub fn insert(&self, path: String, descriptor: MpdDescriptor) {
        self.entries.insert(path, descriptor);
        if let Err(e) = self.persist() {
            error!(error = %e, "failed to persist MPD index");
        }
    }

    fn persist(&self) -> Result<(), CacheError> {
        let snapshot: HashMap<String, MpdDescriptor> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| CacheError::IndexPersistFailure(e.to_string()))?;
        if let Some(parent) = Path::new(&self.index_path).parent() {
            std::fs::create_dir_all(parent).map_err(CacheError::Io)?;
        }
        std::fs::write(&self.index_path, json).map_err(CacheError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> MpdDescriptor {
        MpdDescriptor {
            bandwidth_list: vec![400_000, 800_000, 1_500_000],
            http_headers: HashMap::new(),
        }
    }

    #[test]
    fn picks_highest_rung_not_exceeding_forecast() {
        let rung = descriptor().rung_for_forecast(Some(1_000_000.0));
        assert_eq!(rung, Some(800_000));
    }

    #[test]
    fn falls_back_to_lowest_rung_below_ladder() {
        let rung = descriptor().rung_for_forecast(Some(100.0));
        assert_eq!(rung, Some(400_000));
    }

    #[test]
    fn falls_back_to_lowest_rung_when_forecast_missing() {
        let rung = descriptor().rung_for_forecast(None);
        assert_eq!(rung, Some(400_000));
    }

    #[test]
    fn picks_highest_rung_when_forecast_exceeds_ladder() {
        let rung = descriptor().rung_for_forecast(Some(10_000_000.0));
        assert_eq!(rung, Some(1_500_000));
    }

    #[test]
    fn cold_index_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = MpdIndex::load(dir.path().join("mpd_index.json"));
        assert!(!index.contains("bbb.mpd"));
    }

    #[test]
    fn insert_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("mpd_index.json");
        let index = MpdIndex::load(&index_path);
        index.insert("bbb.mpd".to_string(), descriptor());
        assert!(index_path.exists());

        let reloaded = MpdIndex::load(&index_path);
        assert!(reloaded.contains("bbb.mpd"));
        assert_eq!(
            reloaded.get("bbb.mpd").unwrap().bandwidth_list,
            vec![400_000, 800_000, 1_500_000]
        );
    }
}
