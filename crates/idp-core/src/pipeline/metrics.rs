//! Process-wide pipeline metrics.
//!
//! Shared by every concurrent extraction. Histogram updates are lock-free;
//! labelled counters take a short mutex.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::models::document::DocType;

const BUCKETS: usize = 8;

/// Upper bounds (ms) of the latency histogram buckets.
pub const LATENCY_BUCKETS_MS: [f64; BUCKETS] = [100.0, 250.0, 500.0, 1000.0, 2000.0, 3000.0, 5000.0, 10000.0];

pub const LATENCY_METRIC: &str = "idp_extraction_latency_ms";
pub const VALIDATION_FAILURES_METRIC: &str = "idp_validation_failures_total";
pub const DOCUMENTS_METRIC: &str = "idp_documents_processed_total";
pub const STAGE_RUNS_METRIC: &str = "idp_stage_runs_total";

/// Counters and histograms for the extraction pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Per-bucket (non-cumulative) counts; the last slot is `+Inf`.
    latency_buckets: [AtomicU64; BUCKETS + 1],
    /// Sum of observed latencies, in microseconds.
    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    validation_failures: Mutex<BTreeMap<String, u64>>,
    documents_processed: Mutex<BTreeMap<String, u64>>,
    stage_runs: Mutex<BTreeMap<(String, &'static str), u64>>,
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// `(upper bound ms, cumulative count)`, ending with `+Inf`.
    pub latency_buckets: Vec<(f64, u64)>,
    pub latency_sum_ms: f64,
    pub latency_count: u64,
    pub validation_failures: BTreeMap<String, u64>,
    pub documents_processed: BTreeMap<String, u64>,
    pub stage_runs: BTreeMap<String, u64>,
}

fn bump<K: Ord>(map: &Mutex<BTreeMap<K, u64>>, key: K) {
    let mut map = map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *map.entry(key).or_insert(0) += 1;
}

fn copy<K: Ord + Clone>(map: &Mutex<BTreeMap<K, u64>>) -> BTreeMap<K, u64> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one end-to-end extraction latency.
    pub fn observe_latency(&self, ms: f64) {
        let ms = ms.max(0.0);
        let slot = LATENCY_BUCKETS_MS
            .iter()
            .position(|&upper| ms <= upper)
            .unwrap_or(BUCKETS);
        self.latency_buckets[slot].fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add((ms * 1000.0).round() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one validation error attributed to `field`.
    pub fn record_validation_failure(&self, field: &str) {
        bump(&self.validation_failures, field.to_string());
    }

    /// Count one processed document.
    pub fn record_document(&self, doc_type: DocType) {
        bump(&self.documents_processed, doc_type.as_str().to_string());
    }

    /// Count one stage execution by outcome.
    pub fn record_stage(&self, stage: &str, ok: bool) {
        bump(&self.stage_runs, (stage.to_string(), if ok { "ok" } else { "failed" }));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut cumulative = 0;
        let mut latency_buckets: Vec<(f64, u64)> = LATENCY_BUCKETS_MS
            .iter()
            .zip(&self.latency_buckets)
            .map(|(&upper, count)| {
                cumulative += count.load(Ordering::Relaxed);
                (upper, cumulative)
            })
            .collect();
        cumulative += self.latency_buckets[BUCKETS].load(Ordering::Relaxed);
        latency_buckets.push((f64::INFINITY, cumulative));

        MetricsSnapshot {
            latency_buckets,
            latency_sum_ms: self.latency_sum_us.load(Ordering::Relaxed) as f64 / 1000.0,
            latency_count: self.latency_count.load(Ordering::Relaxed),
            validation_failures: copy(&self.validation_failures),
            documents_processed: copy(&self.documents_processed),
            stage_runs: copy(&self.stage_runs)
                .into_iter()
                .map(|((stage, outcome), n)| (format!("{stage}/{outcome}"), n))
                .collect(),
        }
    }

    /// Prometheus text exposition of the current values.
    pub fn render(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        let _ = writeln!(out, "# HELP {LATENCY_METRIC} End-to-end extraction latency in milliseconds.");
        let _ = writeln!(out, "# TYPE {LATENCY_METRIC} histogram");
        for (upper, count) in &snapshot.latency_buckets {
            let le = if upper.is_infinite() { "+Inf".to_string() } else { upper.to_string() };
            let _ = writeln!(out, "{LATENCY_METRIC}_bucket{{le=\"{le}\"}} {count}");
        }
        let _ = writeln!(out, "{LATENCY_METRIC}_sum {}", snapshot.latency_sum_ms);
        let _ = writeln!(out, "{LATENCY_METRIC}_count {}", snapshot.latency_count);

        let _ = writeln!(out, "# HELP {VALIDATION_FAILURES_METRIC} Validation errors by field.");
        let _ = writeln!(out, "# TYPE {VALIDATION_FAILURES_METRIC} counter");
        for (field, n) in &snapshot.validation_failures {
            let _ = writeln!(out, "{VALIDATION_FAILURES_METRIC}{{field=\"{field}\"}} {n}");
        }

        let _ = writeln!(out, "# HELP {DOCUMENTS_METRIC} Documents processed by type.");
        let _ = writeln!(out, "# TYPE {DOCUMENTS_METRIC} counter");
        for (doc_type, n) in &snapshot.documents_processed {
            let _ = writeln!(out, "{DOCUMENTS_METRIC}{{doc_type=\"{doc_type}\"}} {n}");
        }

        let _ = writeln!(out, "# HELP {STAGE_RUNS_METRIC} Pipeline stage executions by outcome.");
        let _ = writeln!(out, "# TYPE {STAGE_RUNS_METRIC} counter");
        for ((stage, outcome), n) in copy(&self.stage_runs) {
            let _ = writeln!(out, "{STAGE_RUNS_METRIC}{{stage=\"{stage}\",outcome=\"{outcome}\"}} {n}");
        }

        out
    }
}
