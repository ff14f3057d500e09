use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub prefetch: PrefetchConfig,
    pub origin: OriginConfig,
    pub mpd: MpdConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Loads `config.toml` from the current working directory. Falls back
    /// to an all-defaults configuration when the file is missing so the
    /// server can start with just origin/mpd settings supplied via
    /// environment-specific overrides in a real deployment.
    pub fn load() -> AnyResult<Self> {
        let config_str = match std::fs::read_to_string("config.toml") {
            Ok(s) => s,
            Err(_) => return Ok(Self::default()),
        };
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }
}
