//! Per-session state: the last observed throughput sample and the SMART
//! forecaster, keyed by `(Username, SessionId)` (§3, §4.4).

use dashmap::DashMap;

use crate::common::types::{now_ms, SessionKey};
use crate::prefetch::forecast::ForecastState;
use crate::segment::SegmentPath;

#[derive(Debug, Clone, Default)]
pub struct UserRecord {
    /// The bitrate ladder parsed from the MPD this client last pulled
    /// (§3 "User/session state"). `None` until the client's first MPD
    /// parse; mirrors the original server's `USER_DICT['bitrates']`.
    pub bandwidth_list: Vec<u64>,
    /// Set the first time this session's user record is created.
    pub created_at: Option<u64>,
    pub forecaster: ForecastState,
    pub last_served: Option<SegmentPath>,
    /// Measured throughput (bits/s) from the most recently served segment.
    pub last_measured_throughput: Option<f64>,
    /// Client-reported throughput (`Throughput` header) for that segment,
    /// if the client sent one.
    pub last_client_reported_throughput: Option<f64>,
}

/// Concurrent map of session state, one entry per distinct
/// `(Username, SessionId)` pair ever observed (§9 Design Notes: DashMap
/// chosen over a single mutex since sessions don't share eviction state).
#[derive(Default)]
pub struct UserStore {
    records: DashMap<SessionKey, UserRecord>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Records the bitrate ladder parsed from an MPD the first time this
    /// client's session is seen (§3: "updated when the MPD is first parsed
    /// for that client"). Subsequent MPD imports refresh the ladder but
    /// leave `created_at` untouched.
    pub fn record_mpd_ladder(&self, key: &SessionKey, bandwidth_list: Vec<u64>) {
        let mut record = self.records.entry(key.clone()).or_default();
        if record.created_at.is_none() {
            record.created_at = Some(now_ms());
        }
        record.bandwidth_list = bandwidth_list;
    }

    /// Records a just-served segment's throughput samples, without folding
    /// them into the forecaster yet — that happens in the current worker,
    /// and only under the SMART scheme (§4.4).
    pub fn record_observation(
        &self,
        key: &SessionKey,
        served: SegmentPath,
        measured_throughput: f64,
        client_reported_throughput: Option<f64>,
    ) {
        let mut record = self.records.entry(key.clone()).or_default();
        record.last_served = Some(served);
        record.last_measured_throughput = Some(measured_throughput);
        record.last_client_reported_throughput = client_reported_throughput;
    }

    /// Folds the session's last observation into its forecaster state and
    /// returns the resulting forecast, preferring the client-reported
    /// sample over the measured one when both are present (§4.4 step 2a).
    pub fn apply_forecast(&self, key: &SessionKey) -> Option<f64> {
        let mut record = self.records.get_mut(key)?;
        let observed = record
            .last_client_reported_throughput
            .or(record.last_measured_throughput)?;
        Some(record.forecaster.observe(observed))
    }

    pub fn last_served(&self, key: &SessionKey) -> Option<SegmentPath> {
        self.records.get(key).and_then(|r| r.last_served.clone())
    }

    pub fn session_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{SessionId, Username};

    fn key() -> SessionKey {
        (Username("alice".to_string()), SessionId("s1".to_string()))
    }

    fn segment(index: u64) -> SegmentPath {
        SegmentPath {
            title: "bbb".to_string(),
            bitrate: 400_000,
            index,
        }
    }

    #[test]
    fn unknown_session_has_no_forecast() {
        let store = UserStore::new();
        assert_eq!(store.apply_forecast(&key()), None);
    }

    #[test]
    fn record_mpd_ladder_sets_created_at_once() {
        let store = UserStore::new();
        store.record_mpd_ladder(&key(), vec![400_000, 800_000]);
        let first_created_at = store.records.get(&key()).unwrap().created_at;
        assert!(first_created_at.is_some());

        store.record_mpd_ladder(&key(), vec![400_000, 800_000, 1_500_000]);
        let record = store.records.get(&key()).unwrap();
        assert_eq!(record.created_at, first_created_at);
        assert_eq!(record.bandwidth_list, vec![400_000, 800_000, 1_500_000]);
    }

    #[test]
    fn prefers_client_reported_throughput_over_measured() {
        let store = UserStore::new();
        store.record_observation(&key(), segment(0), 100_000.0, Some(900_000.0));
        let forecast = store.apply_forecast(&key()).unwrap();
        // F_1 = 0.8 * 900_000 = 720_000; T_1 = 0.2 * 720_000 = 144_000
        assert!((forecast - 864_000.0).abs() < 1e-6);
    }

    #[test]
    fn falls_back_to_measured_throughput_when_client_silent() {
        let store = UserStore::new();
        store.record_observation(&key(), segment(0), 500_000.0, None);
        let forecast = store.apply_forecast(&key()).unwrap();
        assert!((forecast - 480_000.0).abs() < 1e-6);
    }

    #[test]
    fn tracks_last_served_segment_per_session() {
        let store = UserStore::new();
        store.record_observation(&key(), segment(3), 500_000.0, None);
        assert_eq!(store.last_served(&key()), Some(segment(3)));
    }
}
