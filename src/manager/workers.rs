//! The two background workers inside the cache manager (§4.4, §5):
//! the current worker turns a served segment into a forecast and a next
//! path; the prefetch worker pulls that path into the cache.
//!
//! Grounded in the teacher's background-thread-plus-shared-state pattern
//! (`audio/source/http/prefetcher.rs`), adapted from a parking_lot
//! Mutex+Condvar loop to async flume receivers since jobs here are
//! discrete path fetches rather than a continuous byte stream.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::manager::{CacheManager, ServedJob};
use crate::segment::{FetchReason, SegmentPath};

/// How long a worker waits on its queue before checking the stop flag.
/// Bounds shutdown latency without busy-polling (§4.4: "both workers
/// terminate within one iteration of being signalled").
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn current_worker(manager: Arc<CacheManager>) {
    loop {
        let job = match tokio::time::timeout(POLL_INTERVAL, manager.current_rx().recv_async()).await {
            Ok(Ok(job)) => job,
            Ok(Err(_)) => break, // channel closed
            Err(_) => {
                if manager.should_stop() {
                    break;
                }
                continue;
            }
        };
        handle_served(&manager, job).await;
    }
    debug!("current worker shutting down");
}

async fn handle_served(manager: &Arc<CacheManager>, job: ServedJob) {
    let Some(served) = SegmentPath::parse(&job.path) else {
        warn!(path = %job.path, "current worker received a non-segment path; ignoring");
        return;
    };
    let session_key = CacheManager::session_key(&job.username, &job.session_id);

    let forecast = match manager.prefetch_scheme() {
        crate::configs::PrefetchScheme::Smart => manager.users.apply_forecast(&session_key),
        crate::configs::PrefetchScheme::Simple => None,
    };

    let ladder = manager.mpd_index.get(&format!("{}.mpd", served.title));
    let next = crate::prefetch::plan_next(&served, manager.prefetch_scheme(), forecast, ladder.as_ref());
    let next_path = next.to_path();

    if manager.cache.contains(&next_path).await {
        debug!(path = %next_path, "predicted segment already cached; skipping prefetch");
        return;
    }
    if !manager.check_content_server(&next_path) {
        warn!(path = %next_path, "predicted segment is not served by any known origin; dropping");
        return;
    }
    info!(path = %next_path, forecast, "queuing prefetch job");
    manager.enqueue_prefetch(next_path);
}

pub async fn prefetch_worker(manager: Arc<CacheManager>) {
    loop {
        let path = match tokio::time::timeout(POLL_INTERVAL, manager.prefetch_rx().recv_async()).await {
            Ok(Ok(path)) => path,
            Ok(Err(_)) => break,
            Err(_) => {
                if manager.should_stop() {
                    break;
                }
                continue;
            }
        };
        if let Err(e) = manager.cache.get_file(&path, FetchReason::Prefetch).await {
            warn!(path = %path, error = %e, "prefetch job failed");
        }
        manager.clear_in_flight(&path);
    }
    debug!("prefetch worker shutting down");
}
