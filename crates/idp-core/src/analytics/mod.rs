//! Analytics sink: persists a flattened projection of extraction runs and
//! reports the fields that fail validation most often.

mod sqlite;

pub use sqlite::SqliteSink;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::SinkError;
use crate::models::config::StorageConfig;
use crate::models::document::{DocType, ExtractionRun, FailureCount};

/// One persisted row: a single field of a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRow {
    pub request_id: Uuid,
    pub doc_type: DocType,
    pub field_name: String,
    /// String form of the value, empty when the value is null.
    pub value: String,
    pub confidence: f32,
    pub valid: bool,
}

impl AnalyticsRow {
    /// Flatten a run into rows, documents in order, fields by name.
    pub fn project(run: &ExtractionRun) -> Vec<AnalyticsRow> {
        run.documents
            .iter()
            .flat_map(|doc| {
                doc.fields.iter().map(move |(name, field)| AnalyticsRow {
                    request_id: run.request_id,
                    doc_type: doc.doc_type,
                    field_name: name.clone(),
                    value: field
                        .candidate
                        .value
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                    confidence: field.candidate.confidence,
                    valid: field.valid,
                })
            })
            .collect()
    }
}

/// Destination for run projections.
///
/// Implementations must tolerate concurrent `persist` calls without losing
/// rows.
pub trait AnalyticsSink: Send + Sync {
    /// Store the projection of a run.
    fn persist(&self, run: &ExtractionRun) -> Result<(), SinkError>;

    /// Fields with the most invalid rows, descending by count, ties by name.
    fn top_failures(&self, limit: usize) -> Result<Vec<FailureCount>, SinkError>;
}

/// Sink that stores nothing.
#[derive(Debug, Default)]
pub struct NullSink;

impl AnalyticsSink for NullSink {
    fn persist(&self, _run: &ExtractionRun) -> Result<(), SinkError> {
        Ok(())
    }

    fn top_failures(&self, _limit: usize) -> Result<Vec<FailureCount>, SinkError> {
        Ok(Vec::new())
    }
}

/// Append-only in-process sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<AnalyticsRow>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored rows.
    pub fn rows(&self) -> Vec<AnalyticsRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl AnalyticsSink for MemorySink {
    fn persist(&self, run: &ExtractionRun) -> Result<(), SinkError> {
        let projection = AnalyticsRow::project(run);
        self.rows
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .extend(projection);
        Ok(())
    }

    fn top_failures(&self, limit: usize) -> Result<Vec<FailureCount>, SinkError> {
        let rows = self.rows.lock().map_err(|_| SinkError::Poisoned)?;
        Ok(rank_failures(rows.iter().filter(|r| !r.valid).map(|r| r.field_name.as_str()), limit))
    }
}

/// Count failures per field and rank them.
fn rank_failures<'a>(failed_fields: impl Iterator<Item = &'a str>, limit: usize) -> Vec<FailureCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for field in failed_fields {
        *counts.entry(field).or_insert(0) += 1;
    }

    let mut ranked: Vec<FailureCount> = counts
        .into_iter()
        .map(|(field, failure_count)| FailureCount {
            field: field.to_string(),
            failure_count,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.failure_count
            .cmp(&a.failure_count)
            .then_with(|| a.field.cmp(&b.field))
    });
    ranked.truncate(limit);
    ranked
}

/// Open the sink described by the storage configuration.
pub fn open_sink(config: &StorageConfig) -> Result<Arc<dyn AnalyticsSink>, SinkError> {
    match &config.database_path {
        Some(path) => Ok(Arc::new(SqliteSink::open(path)?) as Arc<dyn AnalyticsSink>),
        None => {
            info!("Analytics persistence disabled");
            Ok(Arc::new(NullSink) as Arc<dyn AnalyticsSink>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::run_with;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_projection_is_one_row_per_field() {
        let run = run_with(&[
            (DocType::Invoice, &[("invoice_number", "INV-1", true), ("total_amount", "5.00", false)]),
            (DocType::Unknown, &[("tax_id", "x", false)]),
        ]);

        let rows = AnalyticsRow::project(&run);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.request_id == run.request_id));

        let summary: Vec<(&str, DocType, bool)> = rows
            .iter()
            .map(|r| (r.field_name.as_str(), r.doc_type, r.valid))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("invoice_number", DocType::Invoice, true),
                ("total_amount", DocType::Invoice, false),
                ("tax_id", DocType::Unknown, false),
            ]
        );
        assert_eq!(rows[0].value, "INV-1");
    }

    #[test]
    fn test_projection_is_deterministic() {
        let run = run_with(&[(DocType::Invoice, &[("b", "2", true), ("a", "1", false)])]);
        assert_eq!(AnalyticsRow::project(&run), AnalyticsRow::project(&run));
    }

    #[test]
    fn test_memory_sink_ranks_failures() {
        let sink = MemorySink::new();
        sink.persist(&run_with(&[(DocType::Invoice, &[("total_amount", "1", false), ("tax_id", "x", false)])]))
            .unwrap();
        sink.persist(&run_with(&[(DocType::Invoice, &[("total_amount", "2", false), ("bank_account", "y", false)])]))
            .unwrap();
        sink.persist(&run_with(&[(DocType::Invoice, &[("invoice_number", "INV-1", true)])]))
            .unwrap();

        let top = sink.top_failures(10).unwrap();
        let ranked: Vec<(&str, u64)> = top.iter().map(|f| (f.field.as_str(), f.failure_count)).collect();
        assert_eq!(ranked, vec![("total_amount", 2), ("bank_account", 1), ("tax_id", 1)]);

        assert_eq!(sink.top_failures(1).unwrap().len(), 1);
        assert_eq!(sink.rows().len(), 5);
    }

    #[test]
    fn test_concurrent_persists_keep_every_row() {
        let sink = Arc::new(MemorySink::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        sink.persist(&run_with(&[(DocType::Invoice, &[("tax_id", "x", false)])]))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.top_failures(5).unwrap()[0].failure_count, 200);
    }

    #[test]
    fn test_null_sink() {
        let sink = NullSink;
        sink.persist(&run_with(&[(DocType::Invoice, &[("tax_id", "x", false)])])).unwrap();
        assert!(sink.top_failures(5).unwrap().is_empty());
    }

    #[test]
    fn test_open_sink_without_path_is_null() {
        let config = StorageConfig {
            database_path: None,
            ..StorageConfig::default()
        };
        let sink = open_sink(&config).unwrap();
        assert!(sink.top_failures(5).unwrap().is_empty());
    }
}
