//! Request dispatcher (C5): the axum router and the shared application
//! state every handler closes over.

pub mod app_state;
pub mod dispatcher;

use std::sync::Arc;

use axum::{routing::get, Router};

pub use app_state::AppState;

/// Builds the single catch-all route the dispatcher classifies (§4.5):
/// every GET, regardless of path shape, is handed to `serve_path`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/{*path}", get(dispatcher::serve_path))
        .with_state(state)
}
