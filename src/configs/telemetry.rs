use serde::{Deserialize, Serialize};

/// Which `TelemetrySink` implementation the measurement list writes through
/// to. The append-only in-memory list (§3) is always authoritative for the
/// SMART forecaster; this only controls the optional external sink (§6).
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TelemetrySinkKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub sink: TelemetrySinkKind,
    pub sqlite_path: Option<String>,
    /// `CREATE TABLE` statements run once against the sqlite sink on open.
    pub table_list: Vec<String>,
}
