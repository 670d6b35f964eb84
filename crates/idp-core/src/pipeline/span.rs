//! Scoped tracing around pipeline stages.

use std::time::Instant;

use tracing::span::EnteredSpan;
use tracing::{debug, info_span, warn};
use uuid::Uuid;

use super::metrics::PipelineMetrics;

/// Guard for one pipeline stage.
///
/// Entering logs the start; dropping logs the end with the elapsed time and
/// records the outcome. A stage counts as failed unless [`StageSpan::finish`]
/// was called, so early returns and panics are reported as failures.
pub struct StageSpan<'a> {
    name: &'static str,
    started: Instant,
    ok: bool,
    metrics: &'a PipelineMetrics,
    _entered: EnteredSpan,
}

impl<'a> StageSpan<'a> {
    pub fn enter(name: &'static str, request_id: Uuid, metrics: &'a PipelineMetrics) -> Self {
        let entered = info_span!("stage", stage = name, %request_id).entered();
        debug!(stage = name, "start");
        Self {
            name,
            started: Instant::now(),
            ok: false,
            metrics,
            _entered: entered,
        }
    }

    /// Mark the stage as successful and close it.
    pub fn finish(mut self) {
        self.ok = true;
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for StageSpan<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        if self.ok {
            debug!(stage = self.name, elapsed_ms, "end");
        } else {
            warn!(stage = self.name, elapsed_ms, "end (failed)");
        }
        self.metrics.record_stage(self.name, self.ok);
    }
}

/// Run a fallible stage inside a [`StageSpan`].
pub fn run_stage<T, E>(
    name: &'static str,
    request_id: Uuid,
    metrics: &PipelineMetrics,
    stage: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let span = StageSpan::enter(name, request_id, metrics);
    let result = stage();
    if result.is_ok() {
        span.finish();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(metrics: &PipelineMetrics, key: &str) -> u64 {
        metrics.snapshot().stage_runs.get(key).copied().unwrap_or(0)
    }

    #[test]
    fn test_successful_stage() {
        let metrics = PipelineMetrics::new();
        let out: Result<u32, String> = run_stage("detect", Uuid::new_v4(), &metrics, || Ok(7));

        assert_eq!(out, Ok(7));
        assert_eq!(runs(&metrics, "detect/ok"), 1);
        assert_eq!(runs(&metrics, "detect/failed"), 0);
    }

    #[test]
    fn test_exit_hook_runs_on_failure() {
        let metrics = PipelineMetrics::new();
        let out: Result<u32, String> = run_stage("assemble", Uuid::new_v4(), &metrics, || Err("boom".into()));

        assert!(out.is_err());
        assert_eq!(runs(&metrics, "assemble/failed"), 1);
    }

    #[test]
    fn test_unfinished_guard_counts_as_failed() {
        let metrics = PipelineMetrics::new();
        fn early_return(metrics: &PipelineMetrics) -> Option<()> {
            let _span = StageSpan::enter("validate", Uuid::new_v4(), metrics);
            None::<()>?;
            Some(())
        }

        assert!(early_return(&metrics).is_none());
        assert_eq!(runs(&metrics, "validate/failed"), 1);
    }

    #[test]
    fn test_exit_hook_runs_on_panic() {
        let metrics = PipelineMetrics::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _span = StageSpan::enter("persist", Uuid::new_v4(), &metrics);
            panic!("stage panicked");
        }));

        assert!(outcome.is_err());
        assert_eq!(runs(&metrics, "persist/failed"), 1);
    }
}
