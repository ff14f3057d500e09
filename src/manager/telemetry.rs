//! Telemetry sink (ambient stack): records the append-only measurement
//! log described in §3 for offline inspection. Not part of the cache's
//! request-serving path — a sink failure is logged and otherwise ignored.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::common::types::{now_ms, AnyResult, SessionId, Username};

/// One row of the measurement log: `(timestamp, username, session_id,
/// bytes_x8, request_time_s, measured_throughput, client_reported_throughput,
/// trend_term, forecast_term)` (§3). `trend_term`/`forecast_term` are kept
/// `None` here by design (§9 Design Notes): the per-session forecaster
/// state is the authoritative, atomically-updated source for those two
/// columns, so the log itself stays a plain observational record.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementRow {
    pub timestamp: u64,
    pub username: String,
    pub session_id: String,
    pub path: String,
    pub bytes_x8: u64,
    pub request_time_s: f64,
    pub measured_throughput: f64,
    pub client_reported_throughput: Option<f64>,
    pub trend_term: Option<f64>,
    pub forecast_term: Option<f64>,
}

impl MeasurementRow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        username: &Username,
        session_id: &SessionId,
        path: &str,
        bytes_x8: u64,
        request_time_s: f64,
        measured_throughput: f64,
        client_reported_throughput: Option<f64>,
    ) -> Self {
        Self {
            timestamp: now_ms(),
            username: username.0.clone(),
            session_id: session_id.0.clone(),
            path: path.to_string(),
            bytes_x8,
            request_time_s,
            measured_throughput,
            client_reported_throughput,
            trend_term: None,
            forecast_term: None,
        }
    }
}

/// A destination for measurement rows. Implementations must not block the
/// request path; the manager records rows on a `spawn_blocking` task.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, row: &MeasurementRow) -> AnyResult<()>;
}

/// Default sink: keeps rows in memory, capped to avoid unbounded growth on
/// a long-running cache. Good enough for tests and small deployments.
pub struct InMemorySink {
    rows: Mutex<Vec<MeasurementRow>>,
    capacity: usize,
}

impl InMemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn snapshot(&self) -> Vec<MeasurementRow> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TelemetrySink for InMemorySink {
    fn record(&self, row: &MeasurementRow) -> AnyResult<()> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if rows.len() >= self.capacity {
            rows.remove(0);
        }
        rows.push(row.clone());
        Ok(())
    }
}

/// Durable sink backed by a bundled SQLite database (enriched from the
/// ambient stack; see DESIGN.md). Always has a `measurements` table,
/// append-only; `table_list` lets a deployment's config add further tables
/// to the same database (§6), the way the original's `config_cdash.
/// TABLE_LIST` drove `CacheManager.create_db`.
pub struct SqliteSink {
    conn: Mutex<rusqlite::Connection>,
}

const MEASUREMENTS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS measurements (
    timestamp INTEGER NOT NULL,
    username TEXT NOT NULL,
    session_id TEXT NOT NULL,
    path TEXT NOT NULL,
    bytes_x8 INTEGER NOT NULL,
    request_time_s REAL NOT NULL,
    measured_throughput REAL NOT NULL,
    client_reported_throughput REAL,
    trend_term REAL,
    forecast_term REAL
)";

impl SqliteSink {
    /// Opens (creating if needed) the sqlite database at `path`, running
    /// every statement in `table_list` against it first. A statement that
    /// fails (most commonly because its table already exists and it wasn't
    /// written with `IF NOT EXISTS`) is logged and skipped rather than
    /// failing the whole open, mirroring the original's per-statement
    /// try/except around `cur.execute(table)`. The built-in `measurements`
    /// schema is then ensured unconditionally, since `record` depends on it
    /// regardless of what `table_list` contains.
    pub fn open(path: impl AsRef<Path>, table_list: &[String]) -> AnyResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)?;

        for statement in table_list {
            match conn.execute(statement, []) {
                Ok(_) => info!(statement, "created table from configured table_list"),
                Err(e) => info!(statement, error = %e, "table statement failed; assuming it already exists"),
            }
        }

        conn.execute(MEASUREMENTS_SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl TelemetrySink for SqliteSink {
    fn record(&self, row: &MeasurementRow) -> AnyResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO measurements
                (timestamp, username, session_id, path, bytes_x8, request_time_s,
                 measured_throughput, client_reported_throughput, trend_term, forecast_term)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                row.timestamp as i64,
                row.username,
                row.session_id,
                row.path,
                row.bytes_x8 as i64,
                row.request_time_s,
                row.measured_throughput,
                row.client_reported_throughput,
                row.trend_term,
                row.forecast_term,
            ],
        )?;
        Ok(())
    }
}

/// Records `row` on a blocking task so a slow sink (disk-bound SQLite
/// writes in particular) never stalls the async request path.
pub async fn record_async(sink: Arc<dyn TelemetrySink>, row: MeasurementRow) {
    let result = tokio::task::spawn_blocking(move || sink.record(&row)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "telemetry sink rejected a row"),
        Err(e) => error!(error = %e, "telemetry recording task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> MeasurementRow {
        MeasurementRow::new(
            &Username("alice".to_string()),
            &SessionId("s1".to_string()),
            "bbb/800000/bbb_seg_1.m4s",
            1_200_000,
            0.8,
            1_500_000.0,
            Some(1_400_000.0),
        )
    }

    #[test]
    fn in_memory_sink_keeps_recorded_rows() {
        let sink = InMemorySink::new(10);
        sink.record(&sample_row()).unwrap();
        assert_eq!(sink.snapshot().len(), 1);
    }

    #[test]
    fn in_memory_sink_drops_oldest_past_capacity() {
        let sink = InMemorySink::new(2);
        for _ in 0..3 {
            sink.record(&sample_row()).unwrap();
        }
        assert_eq!(sink.snapshot().len(), 2);
    }

    #[test]
    fn sqlite_sink_persists_a_row() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteSink::open(dir.path().join("telemetry.sqlite3"), &[]).unwrap();
        sink.record(&sample_row()).unwrap();

        let conn = sink.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM measurements", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn open_creates_every_table_in_table_list() {
        let dir = tempfile::tempdir().unwrap();
        let table_list = vec![
            "CREATE TABLE IF NOT EXISTS sessions (username TEXT, session_id TEXT)".to_string(),
            "CREATE TABLE IF NOT EXISTS bitrates (title TEXT, bandwidth INTEGER)".to_string(),
        ];
        let sink = SqliteSink::open(dir.path().join("telemetry.sqlite3"), &table_list).unwrap();

        let conn = sink.conn.lock().unwrap();
        for table in ["measurements", "sessions", "bitrates"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "expected table {table} to exist");
        }
    }

    #[test]
    fn open_tolerates_a_table_statement_that_fails() {
        let dir = tempfile::tempdir().unwrap();
        let table_list = vec!["not valid sql".to_string()];
        // A bad statement is logged and skipped rather than failing `open`;
        // the built-in `measurements` table is still created.
        let sink = SqliteSink::open(dir.path().join("telemetry.sqlite3"), &table_list).unwrap();
        sink.record(&sample_row()).unwrap();
    }
}
