//! Origin client (C1): fetches manifests and segments from the upstream
//! content server the cache fronts.

use bytes::Bytes;
use reqwest::Client;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::common::errors::CacheError;
use crate::common::http::HttpClient;
use crate::configs::OriginConfig;

/// A fetched origin response: the body plus the headers worth replaying to
/// the client and persisting in the cache (§3's "response headers" field).
pub struct OriginResponse {
    pub body: Bytes,
    pub headers: HashMap<String, String>,
}

/// Talks to the upstream content server. Holds a single pooled `reqwest`
/// client, matching the teacher's one-client-per-component convention.
pub struct OriginClient {
    client: Client,
    config: OriginConfig,
}

impl OriginClient {
    pub fn new(config: OriginConfig) -> Result<Self, CacheError> {
        let client = HttpClient::new().map_err(|e| CacheError::OriginUnreachable(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Resolves `cache_path` (e.g. `bbb.mpd`, `bbb/800000/bbb_seg_3.m4s`) to
    /// an origin URL by routing its leading title token through the
    /// configured prefix table, then joining onto `base_url`.
    pub fn resolve_url(&self, cache_path: &str) -> String {
        let title = cache_path.split('/').next().unwrap_or(cache_path);
        let title = title.strip_suffix(".mpd").unwrap_or(title);
        let prefix = self.config.prefix_for(title);
        let base = self.config.base_url.trim_end_matches('/');
        let prefix = prefix.trim_start_matches('/').trim_end_matches('/');
        if prefix.is_empty() {
            format!("{base}/{cache_path}")
        } else {
            format!("{base}/{prefix}/{cache_path}")
        }
    }

    /// Fetches `cache_path` from the origin. Any non-2xx response or
    /// transport failure is reported as `OriginUnreachable` (§7); the
    /// dispatcher and workers never see raw `reqwest` errors.
    pub async fn fetch(&self, cache_path: &str) -> Result<OriginResponse, CacheError> {
        let url = self.resolve_url(cache_path);
        debug!(cache_path, url, "fetching from origin");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CacheError::OriginUnreachable(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            warn!(url, status = %response.status(), "origin returned non-success status");
            return Err(CacheError::OriginUnreachable(format!(
                "{url}: status {}",
                response.status()
            )));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| CacheError::OriginUnreachable(format!("{url}: {e}")))?;

        Ok(OriginResponse { body, headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_prefix(title: &str, prefix: &str) -> OriginConfig {
        let mut title_prefix_map = HashMap::new();
        title_prefix_map.insert(title.to_string(), prefix.to_string());
        OriginConfig {
            base_url: "https://origin.example.com".to_string(),
            title_prefix_map,
        }
    }

    #[test]
    fn resolves_mpd_path_through_prefix_map() {
        let origin = OriginClient {
            client: HttpClient::new().unwrap(),
            config: config_with_prefix("bbb", "/video/bbb"),
        };
        assert_eq!(
            origin.resolve_url("bbb.mpd"),
            "https://origin.example.com/video/bbb/bbb.mpd"
        );
    }

    #[test]
    fn resolves_segment_path_through_prefix_map() {
        let origin = OriginClient {
            client: HttpClient::new().unwrap(),
            config: config_with_prefix("bbb", "/video/bbb"),
        };
        assert_eq!(
            origin.resolve_url("bbb/800000/bbb_seg_3.m4s"),
            "https://origin.example.com/video/bbb/bbb/800000/bbb_seg_3.m4s"
        );
    }

    #[test]
    fn falls_back_to_root_prefix_for_unknown_title() {
        let origin = OriginClient {
            client: HttpClient::new().unwrap(),
            config: config_with_prefix("bbb", "/video/bbb"),
        };
        assert_eq!(
            origin.resolve_url("unknown.mpd"),
            "https://origin.example.com/unknown.mpd"
        );
    }
}
