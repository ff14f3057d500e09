//! Cache manager (C4): owns the priority cache, the MPD index, per-session
//! forecaster state, and the current/prefetch queues and workers that
//! turn a served segment into the next speculative fetch (§4.4).

pub mod telemetry;
pub mod users;
pub mod workers;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashSet;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::PriorityCache;
use crate::common::errors::CacheError;
use crate::common::types::{now_ms, SessionId, SessionKey, Username};
use crate::configs::{Config, PrefetchScheme, TelemetrySinkKind};
use crate::mpd::MpdIndex;
use crate::origin::OriginClient;
use crate::segment::{FetchReason, SegmentPath};

use telemetry::{InMemorySink, SqliteSink, TelemetrySink};
use users::UserStore;

/// A segment just served to a client, queued for the current worker to
/// plan the next prefetch from (§4.4 `enqueue_served`).
#[derive(Debug, Clone)]
pub struct ServedJob {
    pub path: String,
    pub username: Username,
    pub session_id: SessionId,
}

pub struct CacheManager {
    pub cache: Arc<PriorityCache>,
    pub mpd_index: Arc<MpdIndex>,
    pub users: UserStore,
    pub telemetry: Arc<dyn TelemetrySink>,
    in_flight: DashSet<String>,
    current_tx: flume::Sender<ServedJob>,
    current_rx: flume::Receiver<ServedJob>,
    prefetch_tx: flume::Sender<String>,
    prefetch_rx: flume::Receiver<String>,
    prefetch_scheme: PrefetchScheme,
    mpd_source_list: std::collections::HashSet<String>,
    stop: AtomicBool,
}

impl CacheManager {
    pub fn new(config: &Config) -> Result<Arc<Self>, CacheError> {
        let origin = Arc::new(OriginClient::new(config.origin.clone())?);
        let cache = Arc::new(PriorityCache::new(&config.cache, origin));
        let mpd_index = Arc::new(MpdIndex::load(&config.mpd.index_path));
        let telemetry: Arc<dyn TelemetrySink> = match config.telemetry.sink {
            TelemetrySinkKind::Memory => Arc::new(InMemorySink::new(10_000)),
            TelemetrySinkKind::Sqlite => {
                let path = config
                    .telemetry
                    .sqlite_path
                    .clone()
                    .unwrap_or_else(|| "telemetry.sqlite3".to_string());
                Arc::new(
                    SqliteSink::open(path, &config.telemetry.table_list)
                        .map_err(|e| CacheError::IndexPersistFailure(e.to_string()))?,
                )
            }
        };
        let (current_tx, current_rx) = flume::unbounded();
        let (prefetch_tx, prefetch_rx) = flume::unbounded();

        Ok(Arc::new(Self {
            cache,
            mpd_index,
            users: UserStore::new(),
            telemetry,
            in_flight: DashSet::new(),
            current_tx,
            current_rx,
            prefetch_tx,
            prefetch_rx,
            prefetch_scheme: config.prefetch.scheme,
            mpd_source_list: config.mpd.source_list.clone(),
            stop: AtomicBool::new(false),
        }))
    }

    pub fn prefetch_scheme(&self) -> PrefetchScheme {
        self.prefetch_scheme
    }

    /// True if `path`'s title is one this cache actually fronts: either
    /// already indexed from an MPD, or named in the configured MPD source
    /// list. Guards against planning a prefetch for content the origin
    /// doesn't serve (§4.5 `check_content_server`).
    pub fn check_content_server(&self, path: &str) -> bool {
        let Some(title) = path.split('/').next() else {
            return false;
        };
        self.mpd_index.contains(&format!("{title}.mpd")) || self.mpd_source_list.contains(title)
    }

    /// Spawns the current worker and prefetch workers as dedicated tokio
    /// tasks (§5: "exactly two background workers inside C4").
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let current = {
            let manager = Arc::clone(self);
            tokio::spawn(async move { workers::current_worker(manager).await })
        };
        let prefetch = {
            let manager = Arc::clone(self);
            tokio::spawn(async move { workers::prefetch_worker(manager).await })
        };
        vec![current, prefetch]
    }

    /// Signals both workers to stop; they exit within one iteration.
    pub fn terminate(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub(crate) fn current_rx(&self) -> &flume::Receiver<ServedJob> {
        &self.current_rx
    }

    pub(crate) fn prefetch_rx(&self) -> &flume::Receiver<String> {
        &self.prefetch_rx
    }

    /// Fetches `path` straight from the origin, bypassing the segment
    /// cache's index and eviction bookkeeping. Used for MPD import, whose
    /// bytes are persisted under `mpd_root` instead (§4.5 class 2).
    pub async fn cache_origin_fetch(
        &self,
        path: &str,
    ) -> Result<crate::origin::OriginResponse, CacheError> {
        self.cache.fetch_from_origin(path).await
    }

    /// Fetches `path` for a client-driven request, waiting out any
    /// in-flight prefetch of the same path rather than racing it
    /// (§4.4 `fetch`).
    pub async fn fetch(
        &self,
        path: &str,
    ) -> Result<(Bytes, HashMap<String, String>), CacheError> {
        while self.in_flight.contains(path) && !self.cache.contains(path).await {
            tokio::time::sleep(std::time::Duration::from_millis(self.cache.wait_time_ms())).await;
        }
        self.cache.get_file(path, FetchReason::Fetch).await
    }

    /// Queues `(path, username, session_id)` onto the current queue after
    /// a segment has been served (§4.4 `enqueue_served`).
    pub fn enqueue_served(&self, path: String, username: Username, session_id: SessionId) {
        let job = ServedJob {
            path,
            username,
            session_id,
        };
        if self.current_tx.send(job).is_err() {
            debug!("current queue closed; dropping served job");
        }
    }

    /// Queues `path` for background prefetch and marks it in-flight.
    /// Called only by the current worker, after confirming the path isn't
    /// already cached and names content the origin actually serves.
    pub(crate) fn enqueue_prefetch(&self, path: String) {
        self.in_flight.insert(path.clone());
        if self.prefetch_tx.send(path.clone()).is_err() {
            self.in_flight.remove(&path);
            debug!(path = %path, "prefetch queue closed; dropping job");
        }
    }

    pub(crate) fn clear_in_flight(&self, path: &str) {
        self.in_flight.remove(path);
    }

    pub fn session_key(username: &Username, session_id: &SessionId) -> SessionKey {
        (username.clone(), session_id.clone())
    }

    pub fn stats_snapshot(&self) -> ManagerStats {
        ManagerStats {
            in_flight: self.in_flight.len(),
            known_sessions: self.users.session_count(),
            queued_prefetch_jobs: self.prefetch_rx.len(),
            queued_current_jobs: self.current_rx.len(),
            timestamp: now_ms(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ManagerStats {
    pub in_flight: usize,
    pub known_sessions: usize,
    pub queued_prefetch_jobs: usize,
    pub queued_current_jobs: usize,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.cache.cache_root = dir.join("cache").to_string_lossy().to_string();
        config.mpd.index_path = dir.join("mpd_index.json").to_string_lossy().to_string();
        config.origin.base_url = "https://origin.invalid".to_string();
        config
    }

    #[tokio::test]
    async fn serves_a_cache_hit_without_touching_the_origin() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(&test_config(dir.path())).unwrap();

        manager
            .cache
            .store("bbb.mpd", Bytes::from_static(b"<MPD/>"), HashMap::new(), FetchReason::Fetch)
            .await
            .unwrap();

        let (bytes, _) = manager.fetch("bbb.mpd").await.unwrap();
        assert_eq!(&bytes[..], b"<MPD/>");
        assert_eq!(manager.stats_snapshot().in_flight, 0);
    }

    #[tokio::test]
    async fn enqueue_served_populates_the_current_queue() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(&test_config(dir.path())).unwrap();

        manager.enqueue_served(
            "bbb/400000/bbb_seg_1.m4s".to_string(),
            Username("alice".to_string()),
            SessionId("s1".to_string()),
        );
        assert_eq!(manager.stats_snapshot().queued_current_jobs, 1);
    }

    #[test]
    fn check_content_server_recognises_known_and_source_listed_titles() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.mpd.source_list.insert("bbb".to_string());
        let manager = CacheManager::new(&config).unwrap();

        assert!(manager.check_content_server("bbb/400000/bbb_seg_1.m4s"));
        assert!(!manager.check_content_server("unknown/400000/unknown_seg_1.m4s"));
    }
}
