//! Priority cache (C2): on-disk storage for MPD manifests and segments,
//! bounded by `capacity_bytes` and evicted by priority then age (§3).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::common::errors::CacheError;
use crate::common::types::now_ms;
use crate::configs::CacheConfig;
use crate::origin::OriginClient;
use crate::segment::FetchReason;

/// Bookkeeping for a single cached file. The bytes themselves live on disk
/// under `cache_root`; this struct is the in-memory index entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: String,
    pub size_bytes: u64,
    pub http_headers: HashMap<String, String>,
    pub priority: i32,
    pub timestamp: u64,
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    total_bytes: u64,
}

/// Single cache-wide mutex guarding the index, disk I/O, and the origin
/// fetch that fills a miss — held across the whole check-then-fetch-then-
/// store sequence in `get_file` so at most one origin fetch for any path
/// is ever in flight (§4.2, §8 "single-flight"; §9 Design Notes: "simple
/// and sufficient" at this scale).
pub struct PriorityCache {
    inner: Mutex<Inner>,
    origin: Arc<OriginClient>,
    cache_root: PathBuf,
    capacity_bytes: u64,
    fetch_priority: i32,
    prefetch_priority: i32,
    wait_time_ms: u64,
}

impl PriorityCache {
    pub fn new(config: &CacheConfig, origin: Arc<OriginClient>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                total_bytes: 0,
            }),
            origin,
            cache_root: PathBuf::from(&config.cache_root),
            capacity_bytes: config.capacity_bytes,
            fetch_priority: config.fetch_priority,
            prefetch_priority: config.prefetch_priority,
            wait_time_ms: config.wait_time_ms,
        }
    }

    pub fn wait_time_ms(&self) -> u64 {
        self.wait_time_ms
    }

    /// Fetches `cache_path` from the origin without touching the index or
    /// disk. Used for MPD import, which persists into `mpd_root` rather
    /// than `cache_root` (§3: MPDs are never evicted).
    pub async fn fetch_from_origin(
        &self,
        cache_path: &str,
    ) -> Result<crate::origin::OriginResponse, CacheError> {
        self.origin.fetch(cache_path).await
    }

    /// Fault-in fetch: returns the cached file if present (touching its
    /// priority/timestamp), otherwise fetches it from the origin, stores
    /// it, and returns it (§4.2 C2.get_file).
    ///
    /// The cache-wide mutex is acquired once and held for the entire
    /// method — across the presence check, the disk read or origin fetch,
    /// and the store — rather than released between steps. Two concurrent
    /// callers racing a miss on the same (or any) path therefore serialize
    /// here: the second caller blocks on the lock until the first has
    /// finished fetching and storing, then observes a hit instead of
    /// issuing a duplicate origin fetch (§4.2, §8 "single-flight").
    pub async fn get_file(
        &self,
        cache_path: &str,
        reason: FetchReason,
    ) -> Result<(Bytes, HashMap<String, String>), CacheError> {
        let mut guard = self.inner.lock().await;

        if let Some(entry) = guard.entries.get_mut(cache_path) {
            if reason == FetchReason::Fetch {
                entry.priority = self.fetch_priority;
            }
            entry.timestamp = now_ms();
            let headers = entry.http_headers.clone();
            let bytes = tokio::fs::read(self.disk_path(cache_path))
                .await
                .map_err(CacheError::Io)?;
            return Ok((Bytes::from(bytes), headers));
        }

        let response = self.origin.fetch(cache_path).await?;
        self.store_locked(
            &mut guard,
            cache_path,
            response.body.clone(),
            response.headers.clone(),
            reason,
        )
        .await?;
        Ok((response.body, response.headers))
    }

    fn priority_for(&self, reason: FetchReason) -> i32 {
        match reason {
            FetchReason::Fetch => self.fetch_priority,
            FetchReason::Prefetch => self.prefetch_priority,
        }
    }

    fn disk_path(&self, cache_path: &str) -> PathBuf {
        self.cache_root.join(cache_path)
    }

    pub async fn contains(&self, cache_path: &str) -> bool {
        self.inner.lock().await.entries.contains_key(cache_path)
    }

    pub async fn stat(&self, cache_path: &str) -> Option<CacheEntry> {
        self.inner.lock().await.entries.get(cache_path).cloned()
    }

    /// Reads a cached file's bytes and headers. Caller must have already
    /// confirmed the entry exists via `contains`/`stat`; a missing file on
    /// disk despite an index entry is treated as an I/O error rather than
    /// silently re-fetched, since that indicates index/disk drift.
    pub async fn read(&self, cache_path: &str) -> Result<(Bytes, HashMap<String, String>), CacheError> {
        let entry = {
            let guard = self.inner.lock().await;
            guard
                .entries
                .get(cache_path)
                .cloned()
                .ok_or_else(|| CacheError::BadRequest(format!("not cached: {cache_path}")))?
        };
        let bytes = tokio::fs::read(self.disk_path(cache_path))
            .await
            .map_err(CacheError::Io)?;
        Ok((Bytes::from(bytes), entry.http_headers))
    }

    /// Re-stamps an existing entry's timestamp, promoting its priority to
    /// `FETCH` if the access was client-driven and the entry was previously
    /// written by a speculative prefetch. A `PREFETCH`-reason hit never
    /// changes priority: it only refreshes the timestamp, so a segment a
    /// client already pulled in is never demoted back down (§3, §8
    /// "priority monotonicity").
    pub async fn touch(&self, cache_path: &str, reason: FetchReason) {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.entries.get_mut(cache_path) {
            if reason == FetchReason::Fetch {
                entry.priority = self.fetch_priority;
            }
            entry.timestamp = now_ms();
        }
    }

    /// Inserts or refreshes a cache entry, writing `body` to disk and
    /// evicting lower-priority, older entries if capacity requires it.
    /// A `Fetch` access always re-stamps the entry's priority even if it
    /// was previously written as a prefetch, so a segment a client actually
    /// requested is no longer first in line for eviction (§3).
    ///
    /// Acquires the cache-wide mutex itself; callers that already hold it
    /// (namely `get_file`, mid check-then-fetch) use `store_locked` instead
    /// to avoid deadlocking on a re-entrant lock.
    pub async fn store(
        &self,
        cache_path: &str,
        body: Bytes,
        http_headers: HashMap<String, String>,
        reason: FetchReason,
    ) -> Result<(), CacheError> {
        let mut guard = self.inner.lock().await;
        self.store_locked(&mut guard, cache_path, body, http_headers, reason).await
    }

    async fn store_locked(
        &self,
        guard: &mut Inner,
        cache_path: &str,
        body: Bytes,
        http_headers: HashMap<String, String>,
        reason: FetchReason,
    ) -> Result<(), CacheError> {
        let size_bytes = body.len() as u64;
        if size_bytes > self.capacity_bytes {
            return Err(CacheError::CacheFull {
                size: size_bytes,
                capacity: self.capacity_bytes,
            });
        }

        let previous_size = guard.entries.get(cache_path).map(|e| e.size_bytes).unwrap_or(0);
        let needed = guard.total_bytes - previous_size + size_bytes;
        if needed > self.capacity_bytes {
            self.evict_until_fits(guard, needed.saturating_sub(self.capacity_bytes))
                .await?;
        }

        let disk_path = self.disk_path(cache_path);
        if let Some(parent) = disk_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(CacheError::Io)?;
        }
        if let Err(e) = tokio::fs::write(&disk_path, &body).await {
            let _ = tokio::fs::remove_file(&disk_path).await;
            return Err(CacheError::Io(e));
        }

        let entry = CacheEntry {
            path: cache_path.to_string(),
            size_bytes,
            http_headers,
            priority: self.priority_for(reason),
            timestamp: now_ms(),
        };
        guard.total_bytes = guard.total_bytes - previous_size + size_bytes;
        guard.entries.insert(cache_path.to_string(), entry);
        debug!(cache_path, size_bytes, total_bytes = guard.total_bytes, "stored cache entry");
        Ok(())
    }

    /// Evicts entries ordered by priority descending (prefetch before
    /// fetch, since `prefetch_priority > fetch_priority`) then timestamp
    /// ascending (oldest first), until at least `bytes_needed` is freed.
    async fn evict_until_fits(&self, guard: &mut Inner, bytes_needed: u64) -> Result<(), CacheError> {
        let mut candidates: Vec<CacheEntry> = guard.entries.values().cloned().collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.timestamp.cmp(&b.timestamp)));

        let mut freed = 0u64;
        for candidate in candidates {
            if freed >= bytes_needed {
                break;
            }
            if let Some(entry) = guard.entries.remove(&candidate.path) {
                guard.total_bytes = guard.total_bytes.saturating_sub(entry.size_bytes);
                freed += entry.size_bytes;
                let disk_path = self.disk_path(&entry.path);
                if let Err(e) = tokio::fs::remove_file(&disk_path).await {
                    warn!(path = %entry.path, error = %e, "failed to remove evicted file");
                }
                info!(path = %entry.path, size_bytes = entry.size_bytes, "evicted cache entry");
            }
        }

        if freed < bytes_needed {
            warn!(bytes_needed, freed, "eviction could not free enough space");
        }
        Ok(())
    }
}

pub fn disk_path_of(cache_root: impl AsRef<Path>, cache_path: &str) -> PathBuf {
    cache_root.as_ref().join(cache_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity_bytes: u64, cache_root: &str) -> CacheConfig {
        CacheConfig {
            capacity_bytes,
            cache_root: cache_root.to_string(),
            fetch_priority: 0,
            prefetch_priority: 10,
            wait_time_ms: 50,
        }
    }

    fn test_origin() -> Arc<OriginClient> {
        Arc::new(OriginClient::new(crate::configs::OriginConfig {
            base_url: "https://origin.invalid".to_string(),
            title_prefix_map: HashMap::new(),
        }).unwrap())
    }

    #[tokio::test]
    async fn stores_and_reads_back_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriorityCache::new(&config(1_000_000, dir.path().to_str().unwrap()), test_origin());

        cache
            .store("bbb.mpd", Bytes::from_static(b"<MPD/>"), HashMap::new(), FetchReason::Fetch)
            .await
            .unwrap();

        assert!(cache.contains("bbb.mpd").await);
        let (bytes, _) = cache.read("bbb.mpd").await.unwrap();
        assert_eq!(&bytes[..], b"<MPD/>");
    }

    #[tokio::test]
    async fn evicts_prefetch_entries_before_fetch_entries() {
        let dir = tempfile::tempdir().unwrap();
        // Capacity only fits two 10-byte entries.
        let cache = PriorityCache::new(&config(20, dir.path().to_str().unwrap()), test_origin());

        cache
            .store("a_seg_0.m4s", Bytes::from(vec![0u8; 10]), HashMap::new(), FetchReason::Fetch)
            .await
            .unwrap();
        cache
            .store("b_seg_0.m4s", Bytes::from(vec![0u8; 10]), HashMap::new(), FetchReason::Prefetch)
            .await
            .unwrap();

        // A third entry forces an eviction; the prefetch entry must go first.
        cache
            .store("c_seg_0.m4s", Bytes::from(vec![0u8; 10]), HashMap::new(), FetchReason::Fetch)
            .await
            .unwrap();

        assert!(cache.contains("a_seg_0.m4s").await);
        assert!(!cache.contains("b_seg_0.m4s").await);
        assert!(cache.contains("c_seg_0.m4s").await);
    }

    #[tokio::test]
    async fn rejects_entries_larger_than_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriorityCache::new(&config(5, dir.path().to_str().unwrap()), test_origin());

        let result = cache
            .store("too_big.m4s", Bytes::from(vec![0u8; 10]), HashMap::new(), FetchReason::Fetch)
            .await;

        assert!(matches!(result, Err(CacheError::CacheFull { .. })));
    }

    #[tokio::test]
    async fn prefetch_reason_hit_never_demotes_a_fetch_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriorityCache::new(&config(1_000_000, dir.path().to_str().unwrap()), test_origin());

        cache
            .store("bbb/400000/bbb_seg_1.m4s", Bytes::from_static(b"data"), HashMap::new(), FetchReason::Fetch)
            .await
            .unwrap();
        cache.touch("bbb/400000/bbb_seg_1.m4s", FetchReason::Prefetch).await;

        let entry = cache.stat("bbb/400000/bbb_seg_1.m4s").await.unwrap();
        assert_eq!(entry.priority, 0);
    }

    #[tokio::test]
    async fn fetch_reason_hit_promotes_a_prefetch_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriorityCache::new(&config(1_000_000, dir.path().to_str().unwrap()), test_origin());

        cache
            .store("bbb/400000/bbb_seg_1.m4s", Bytes::from_static(b"data"), HashMap::new(), FetchReason::Prefetch)
            .await
            .unwrap();
        cache.touch("bbb/400000/bbb_seg_1.m4s", FetchReason::Fetch).await;

        let entry = cache.stat("bbb/400000/bbb_seg_1.m4s").await.unwrap();
        assert_eq!(entry.priority, 0);
    }

    #[tokio::test]
    async fn concurrent_misses_on_the_same_path_trigger_only_one_origin_fetch() {
        use std::time::Duration;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bbb/800000/bbb_seg_1.m4s"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"data".to_vec())
                    .set_delay(Duration::from_millis(150)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let origin = Arc::new(
            OriginClient::new(crate::configs::OriginConfig {
                base_url: server.uri(),
                title_prefix_map: HashMap::new(),
            })
            .unwrap(),
        );
        let cache = PriorityCache::new(&config(1_000_000, dir.path().to_str().unwrap()), origin);

        let (first, second) = tokio::join!(
            cache.get_file("bbb/800000/bbb_seg_1.m4s", FetchReason::Fetch),
            cache.get_file("bbb/800000/bbb_seg_1.m4s", FetchReason::Fetch),
        );
        assert_eq!(&first.unwrap().0[..], b"data");
        assert_eq!(&second.unwrap().0[..], b"data");

        // `.expect(1)` above asserts exactly one request reached the
        // origin; this double-checks it on drop.
        server.verify().await;
    }
}
