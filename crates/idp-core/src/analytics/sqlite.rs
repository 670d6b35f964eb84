//! SQLite-backed analytics store.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::SinkError;
use crate::models::document::{ExtractionRun, FailureCount};

use super::{AnalyticsRow, AnalyticsSink};

/// Analytics sink writing one row per extracted field.
///
/// Each run is written in a single transaction, so concurrent callers never
/// observe or produce partial runs.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::create_schema(&conn)?;
        info!("Analytics store at {}", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database, dropped with the sink.
    pub fn open_in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn create_schema(conn: &Connection) -> Result<(), SinkError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS field_results (
                id INTEGER PRIMARY KEY,
                request_id TEXT NOT NULL,
                doc_type TEXT NOT NULL,
                field_name TEXT NOT NULL,
                value TEXT NOT NULL,
                confidence REAL NOT NULL,
                valid INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_field_results_invalid
                ON field_results(valid, field_name);
            CREATE INDEX IF NOT EXISTS idx_field_results_request
                ON field_results(request_id);
            "#,
        )?;
        Ok(())
    }

    /// Total stored rows.
    pub fn row_count(&self) -> Result<u64, SinkError> {
        let conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM field_results", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl AnalyticsSink for SqliteSink {
    fn persist(&self, run: &ExtractionRun) -> Result<(), SinkError> {
        let rows = AnalyticsRow::project(run);
        let created_at = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO field_results
                   (request_id, doc_type, field_name, value, confidence, valid, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            )?;
            for row in &rows {
                stmt.execute(params![
                    row.request_id.to_string(),
                    row.doc_type.as_str(),
                    row.field_name,
                    row.value,
                    f64::from(row.confidence),
                    row.valid,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Persisted {} rows for request {}", rows.len(), run.request_id);
        Ok(())
    }

    fn top_failures(&self, limit: usize) -> Result<Vec<FailureCount>, SinkError> {
        let conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        let mut stmt = conn.prepare(
            r#"SELECT field_name, COUNT(*) AS failures
               FROM field_results
               WHERE valid = 0
               GROUP BY field_name
               ORDER BY failures DESC, field_name ASC
               LIMIT ?1"#,
        )?;

        let failures = stmt
            .query_map(params![limit as i64], |row| {
                let count: i64 = row.get(1)?;
                Ok(FailureCount {
                    field: row.get(0)?,
                    failure_count: count as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(failures)
    }
}
