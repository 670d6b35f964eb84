//! Core library for document field extraction and validation.
//!
//! This crate provides:
//! - Page image sources (scanned PDFs via lopdf, raster images)
//! - OCR token assembly on top of a pluggable OCR engine
//! - Heuristic field detection with optional model enrichment
//! - Amount/date normalization and field validation
//! - The extraction pipeline, its metrics and analytics sinks

pub mod analytics;
pub mod error;
pub mod extraction;
pub mod models;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod source;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use analytics::{open_sink, AnalyticsRow, AnalyticsSink, MemorySink, NullSink, SqliteSink};
pub use error::{AssemblyError, EnrichmentError, IdpError, OcrError, Result, SinkError, SourceError};
pub use extraction::{classify, Enrichment, FieldDetector, FieldModel};
pub use models::config::IdpConfig;
pub use models::document::{
    AssembledDocument, BBox, CandidateSource, DocType, DocumentRecord, ExtractedField, ExtractionRun,
    FailureCount, FieldCandidate, FieldValue, Token,
};
pub use normalize::{normalize_amount, normalize_date};
pub use ocr::{OcrEngine, OcrToken, TokenAssembler};
#[cfg(feature = "native")]
pub use ocr::PureOcrEngine;
pub use pipeline::{ExtractionPipeline, MetricsSnapshot, PipelineBuilder, PipelineMetrics};
pub use source::{DocumentSource, ImageFileSource, ImageSource, PageImage, PageSet, PdfImageSource};
pub use validation::{validate_fields, ValidationMessage, ValidationSummary, Validator};
