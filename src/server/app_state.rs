use std::sync::Arc;

use crate::configs::Config;
use crate::manager::CacheManager;

/// Top-level application state, shared across every axum handler.
pub struct AppState {
    pub manager: Arc<CacheManager>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, manager: Arc<CacheManager>) -> Arc<Self> {
        Arc::new(Self { manager, config })
    }
}
