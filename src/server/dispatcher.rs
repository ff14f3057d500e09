//! Request dispatcher (C5, §4.5): classifies each GET into one of four
//! outcomes — known MPD, origin-import MPD, segment, or 404 — and drives
//! the cache manager and telemetry log accordingly.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{info, warn};

use crate::common::errors::{CacheError, DispatchError};
use crate::common::types::{now_secs_f64, SessionId, Username};
use crate::manager::telemetry::{self, MeasurementRow};
use crate::mpd::{parser, MpdDescriptor};
use crate::segment::SegmentPath;
use crate::server::app_state::AppState;

struct RequestContext {
    username: Username,
    session_id: SessionId,
    client_time: Option<f64>,
    client_throughput: Option<f64>,
    /// Client-reported segment size and playback duration (§6). Neither
    /// feeds the core forecast or request-time math (§4.5); they are
    /// extracted per spec so a missing value never fails the request, and
    /// are available for a richer telemetry sink to pick up later.
    #[allow(dead_code)]
    segment_size: Option<u64>,
    #[allow(dead_code)]
    seg_time: Option<f64>,
}

fn extract_context(headers: &HeaderMap) -> RequestContext {
    let header_str = |name: &str| -> Option<String> {
        headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
    };

    RequestContext {
        username: header_str("Username").map(Username).unwrap_or_default(),
        session_id: header_str("Session-ID").map(SessionId).unwrap_or_default(),
        client_time: header_str("Time").and_then(|v| v.parse::<f64>().ok()),
        client_throughput: header_str("Throughput").and_then(|v| v.parse::<f64>().ok()),
        segment_size: header_str("segment_size").and_then(|v| v.parse::<u64>().ok()),
        seg_time: header_str("seg_time").and_then(|v| v.parse::<f64>().ok()),
    }
}

/// `GET /<path>`. Handles all four classes from §4.5.
pub async fn serve_path(
    Path(path): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let path = path.trim_start_matches('/').to_string();
    let t_recv = now_secs_f64();
    let context = extract_context(&headers);

    if path.ends_with(".mpd") {
        return serve_mpd(&path, &context, &state).await;
    }

    if let Some(served) = SegmentPath::parse(&path) {
        if state.manager.check_content_server(&path) {
            return serve_segment(&path, served, t_recv, context, &state).await;
        }
    }

    warn!(path = %path, "no class matched; responding 404");
    DispatchError {
        error: CacheError::BadRequest(format!("unknown path: {path}")),
        path,
    }
    .into_response()
}

async fn serve_mpd(path: &str, context: &RequestContext, state: &Arc<AppState>) -> Response {
    if let Some(descriptor) = state.manager.mpd_index.get(path) {
        // Known MPD: replay the stored descriptor's headers, read the body
        // straight from the mpd_root directory (§4.5 class 1).
        let disk_path = std::path::Path::new(&state.config.mpd.mpd_root).join(path);
        return match tokio::fs::read(&disk_path).await {
            Ok(body) => bytes_response(StatusCode::OK, Bytes::from(body), descriptor.http_headers),
            Err(e) => DispatchError {
                error: CacheError::Io(e),
                path: path.to_string(),
            }
            .into_response(),
        };
    }

    let title = path.strip_suffix(".mpd").unwrap_or(path);
    if !state.config.mpd.source_list.contains(title) {
        return DispatchError {
            error: CacheError::BadRequest(format!("path not listed in any MPD source: {path}")),
            path: path.to_string(),
        }
        .into_response();
    }

    // Origin-listed MPD, not yet imported (§4.5 class 2).
    match import_mpd(path, context, state).await {
        Ok((body, headers)) => bytes_response(StatusCode::OK, body, headers),
        Err(error) => DispatchError {
            error,
            path: path.to_string(),
        }
        .into_response(),
    }
}

async fn import_mpd(
    path: &str,
    context: &RequestContext,
    state: &Arc<AppState>,
) -> Result<(Bytes, HashMap<String, String>), CacheError> {
    let response = state.manager.cache_origin_fetch(path).await?;
    let disk_path = std::path::Path::new(&state.config.mpd.mpd_root).join(path);
    if let Some(parent) = disk_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(CacheError::Io)?;
    }
    tokio::fs::write(&disk_path, &response.body).await.map_err(CacheError::Io)?;

    let bandwidth_list = parser::parse_bandwidth_list(&response.body);
    let http_headers = parser::relevant_headers(&response.headers);
    state.manager.mpd_index.insert(
        path.to_string(),
        MpdDescriptor {
            bandwidth_list: bandwidth_list.clone(),
            http_headers,
        },
    );
    let session_key = (context.username.clone(), context.session_id.clone());
    state.manager.users.record_mpd_ladder(&session_key, bandwidth_list);
    info!(path, "imported MPD from origin");

    Ok((response.body, response.headers))
}

async fn serve_segment(
    path: &str,
    served: SegmentPath,
    t_recv: f64,
    context: RequestContext,
    state: &Arc<AppState>,
) -> Response {
    let result = state.manager.fetch(path).await;
    let (body, headers) = match result {
        Ok(v) => v,
        Err(error) => {
            return DispatchError {
                error,
                path: path.to_string(),
            }
            .into_response();
        }
    };

    let t_done = now_secs_f64();
    let client_header_time = context.client_time.unwrap_or(t_recv);
    // Ad-hoc RTT correction, preserved as specified rather than
    // reinterpreted (§9 Open Questions).
    let request_time_s = (t_done - t_recv) + 2.0 * (client_header_time - t_recv).abs();
    let request_time_s = request_time_s.max(f64::EPSILON);
    let bytes_x8 = body.len() as u64 * 8;
    let measured_throughput = bytes_x8 as f64 / request_time_s;

    let row = MeasurementRow::new(
        &context.username,
        &context.session_id,
        path,
        bytes_x8,
        request_time_s,
        measured_throughput,
        context.client_throughput,
    );
    telemetry::record_async(Arc::clone(&state.manager.telemetry), row).await;

    state.manager.users.record_observation(
        &(context.username.clone(), context.session_id.clone()),
        served,
        measured_throughput,
        context.client_throughput,
    );
    state
        .manager
        .enqueue_served(path.to_string(), context.username, context.session_id);

    bytes_response(StatusCode::OK, body, headers)
}

fn bytes_response(status: StatusCode, body: Bytes, headers: HashMap<String, String>) -> Response {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    match builder.body(Body::from(body)) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "failed to build response with stored headers");
            (StatusCode::OK, body.to_vec()).into_response()
        }
    }
}
