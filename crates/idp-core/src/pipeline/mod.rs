//! Extraction pipeline orchestration.
//!
//! Runs one document through page conversion, token assembly, field
//! detection, classification and validation, then hands the result to the
//! analytics sink. Stage failures before validation reject the whole request;
//! sink failures are logged and never reach the caller.

pub mod metrics;
pub mod span;

pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use span::{run_stage, StageSpan};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::analytics::{open_sink, AnalyticsSink, NullSink};
use crate::error::{IdpError, Result};
use crate::extraction::{classify, Enrichment, FieldDetector};
use crate::models::config::IdpConfig;
use crate::models::document::{
    DocumentRecord, ExtractedField, ExtractionRun, FieldCandidate, RunAnalytics, RunMetrics,
};
use crate::ocr::{OcrEngine, TokenAssembler};
use crate::source::{DocumentSource, ImageSource, PageSet};
use crate::validation::{Fields, ValidationSummary, Validator};

/// The document extraction pipeline.
///
/// Cheap to share behind an `Arc`; concurrent `extract` calls only share the
/// metrics registry and the analytics sink.
pub struct ExtractionPipeline {
    config: IdpConfig,
    source: Box<dyn ImageSource>,
    assembler: TokenAssembler,
    detector: FieldDetector,
    validator: Validator,
    sink: Arc<dyn AnalyticsSink>,
    metrics: Arc<PipelineMetrics>,
}

impl ExtractionPipeline {
    pub fn builder(config: IdpConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &IdpConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn sink(&self) -> &Arc<dyn AnalyticsSink> {
        &self.sink
    }

    /// Extract fields from a PDF or image.
    pub fn extract(&self, document: &[u8]) -> Result<ExtractionRun> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let _request = info_span!("extraction", %request_id).entered();
        info!("Extracting document ({} bytes)", document.len());

        let pages = run_stage("convert", request_id, &self.metrics, || {
            self.source.convert(document, self.config.ocr.dpi)
        })
        .map_err(|e| reject(request_id, e.into()))?;

        self.run(request_id, started, pages)
    }

    /// Extract fields from already converted page images.
    pub fn extract_pages(&self, pages: PageSet) -> Result<ExtractionRun> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let _request = info_span!("extraction", %request_id).entered();

        self.run(request_id, started, pages)
    }

    fn run(&self, request_id: Uuid, started: Instant, pages: PageSet) -> Result<ExtractionRun> {
        let max_pages = self.config.ocr.max_pages;
        let pages = if max_pages > 0 && pages.len() > max_pages {
            info!("Limiting document to {} of {} pages", max_pages, pages.len());
            &pages.pages[..max_pages]
        } else {
            &pages.pages[..]
        };

        let assembled = run_stage("assemble", request_id, &self.metrics, || self.assembler.assemble(pages))
            .map_err(|e| reject(request_id, e.into()))?;

        let span = StageSpan::enter("detect", request_id, &self.metrics);
        let candidates = self.detector.detect(&assembled, pages);
        let doc_type = classify(&assembled.full_text);
        span.finish();

        let span = StageSpan::enter("validate", request_id, &self.metrics);
        let validation = self.validator.validate(&raw_values(&candidates));
        span.finish();

        let fields = with_validity(candidates, &validation);

        self.metrics.record_document(doc_type);
        for message in &validation.errors {
            self.metrics.record_validation_failure(&message.field);
        }

        info!(
            "Document classified as {}: {} fields, {} errors, {} warnings",
            doc_type,
            fields.len(),
            validation.errors.len(),
            validation.warnings.len()
        );

        let mut run = ExtractionRun {
            request_id,
            documents: vec![DocumentRecord {
                doc_type,
                fields,
                validation,
            }],
            metrics: RunMetrics {
                processing_time_ms: elapsed_ms(started),
                ocr_avg_confidence: assembled.avg_confidence,
            },
            analytics: RunAnalytics::default(),
        };

        // Analytics never fail the request
        if let Err(e) = run_stage("persist", request_id, &self.metrics, || self.sink.persist(&run)) {
            warn!("Failed to persist analytics: {}", e);
        }
        run.analytics.top_failures = self
            .sink
            .top_failures(self.config.storage.top_failures_limit)
            .unwrap_or_else(|e| {
                warn!("Failed to read failure analytics: {}", e);
                Vec::new()
            });

        let total_ms = elapsed_ms(started);
        run.metrics.processing_time_ms = total_ms;
        self.metrics.observe_latency(total_ms);

        info!("Extraction finished in {:.1}ms", total_ms);
        Ok(run)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn reject(request_id: Uuid, err: IdpError) -> IdpError {
    error!(%request_id, "Extraction rejected: {}", err);
    err
}

/// Field name to raw value, candidates without a value left out.
fn raw_values(candidates: &BTreeMap<String, FieldCandidate>) -> Fields {
    candidates
        .iter()
        .filter_map(|(name, c)| c.value.clone().map(|v| (name.clone(), v)))
        .collect()
}

/// A field is valid unless an error names it. Warnings never count.
fn with_validity(
    candidates: BTreeMap<String, FieldCandidate>,
    validation: &ValidationSummary,
) -> BTreeMap<String, ExtractedField> {
    candidates
        .into_iter()
        .map(|(name, candidate)| {
            let valid = !validation.has_error_for(&name);
            (name, ExtractedField { candidate, valid })
        })
        .collect()
}

/// Assembles an [`ExtractionPipeline`] from its collaborators.
///
/// Anything not supplied is built from the configuration: the OCR engine
/// from `ocr.model_dir`, the analytics sink from `storage`, the page source
/// by sniffing PDF or image input.
pub struct PipelineBuilder {
    config: IdpConfig,
    source: Option<Box<dyn ImageSource>>,
    engine: Option<Arc<dyn OcrEngine>>,
    enrichment: Enrichment,
    sink: Option<Arc<dyn AnalyticsSink>>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl PipelineBuilder {
    pub fn new(config: IdpConfig) -> Self {
        Self {
            config,
            source: None,
            engine: None,
            enrichment: Enrichment::None,
            sink: None,
            metrics: None,
        }
    }

    pub fn source(mut self, source: impl ImageSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<ExtractionPipeline> {
        let config = self.config;

        if !(0.0..=1.0).contains(&config.layout.confidence_threshold) {
            return Err(IdpError::Config(format!(
                "layout.confidence_threshold must be within 0..1, got {}",
                config.layout.confidence_threshold
            )));
        }

        let engine = match self.engine {
            Some(engine) => engine,
            None => default_engine(&config)?,
        };

        let sink = match self.sink {
            Some(sink) => sink,
            None => open_sink(&config.storage).unwrap_or_else(|e| {
                warn!("Analytics store unavailable ({}), results will not be persisted", e);
                Arc::new(NullSink) as Arc<dyn AnalyticsSink>
            }),
        };

        let source = self
            .source
            .unwrap_or_else(|| Box::new(DocumentSource::new(config.ocr.max_pages)) as Box<dyn ImageSource>);

        Ok(ExtractionPipeline {
            assembler: TokenAssembler::new(engine, &config.ocr),
            detector: FieldDetector::new(self.enrichment, &config.layout),
            validator: Validator::new(config.validation.clone()),
            source,
            sink,
            metrics: self.metrics.unwrap_or_default(),
            config,
        })
    }
}

#[cfg(feature = "native")]
fn default_engine(config: &IdpConfig) -> Result<Arc<dyn OcrEngine>> {
    let engine = crate::ocr::PureOcrEngine::from_dir(&config.ocr.model_dir)?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "native"))]
fn default_engine(_config: &IdpConfig) -> Result<Arc<dyn OcrEngine>> {
    Err(IdpError::Config(
        "no OCR engine supplied and the native engine is not compiled in".to_string(),
    ))
}
