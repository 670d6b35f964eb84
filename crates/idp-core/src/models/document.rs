//! Document data model: OCR tokens, field candidates and extraction results.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::ValidationSummary;

/// Axis-aligned bounding box in pixel space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }
}

/// A single recognized word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Recognized text.
    pub text: String,

    /// Recognition confidence (0.0 - 1.0).
    pub confidence: f32,

    /// Word position on its page.
    pub bbox: BBox,

    /// 1-based page number, assigned by the assembler.
    pub page: u32,

    /// Line index within the page, as reported by the OCR engine.
    pub line: u32,
}

/// All pages of one document merged into a single token stream.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledDocument {
    /// Tokens in page order.
    pub tokens: Vec<Token>,

    /// Per-page texts joined with a newline.
    pub full_text: String,

    /// Number of input pages, empty ones included.
    pub page_count: usize,

    /// Mean token confidence, 0.0 when there are no tokens.
    pub avg_confidence: f32,

    /// Byte range of each page inside `full_text`.
    #[serde(skip)]
    pub page_spans: Vec<Range<usize>>,
}

impl AssembledDocument {
    /// Page (1-based) containing the given byte offset of `full_text`.
    pub fn page_at(&self, offset: usize) -> u32 {
        self.page_spans
            .iter()
            .position(|span| offset <= span.end)
            .map(|idx| idx as u32 + 1)
            .unwrap_or(self.page_count.max(1) as u32)
    }

    /// Tokens recognized on the given page.
    pub fn tokens_on_page(&self, page: u32) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(move |t| t.page == page)
    }
}

/// A field value: the raw captured string, or a number supplied by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(#[serde(with = "rust_decimal::serde::float")] Decimal),
}

impl FieldValue {
    /// String form of the value, as seen by the pattern rules.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    /// Empty strings count as absent values.
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.is_empty())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        FieldValue::Number(d)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Heuristic,
    Model,
}

/// One proposed value for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidate {
    /// Field identifier, e.g. `total_amount`.
    pub name: String,

    /// Proposed value.
    pub value: Option<FieldValue>,

    /// Provenance confidence (0.0 - 1.0).
    pub confidence: f32,

    /// Heuristic rule or model.
    pub source: CandidateSource,

    /// 1-based page the value was found on.
    pub page: u32,

    /// Location of the value, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
}

impl FieldCandidate {
    /// Heuristic candidate on page 1 with no location.
    pub fn heuristic(name: impl Into<String>, value: impl Into<FieldValue>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            confidence,
            source: CandidateSource::Heuristic,
            page: 1,
            bbox: None,
        }
    }

    /// Model candidate on page 1 with no location.
    pub fn model(name: impl Into<String>, value: impl Into<FieldValue>, confidence: f32) -> Self {
        Self {
            source: CandidateSource::Model,
            ..Self::heuristic(name, value, confidence)
        }
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// Coarse document classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Invoice,
    TaxForm,
    IdCard,
    Unknown,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Invoice => "invoice",
            DocType::TaxForm => "tax_form",
            DocType::IdCard => "id_card",
            DocType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The surviving candidate for a field plus its validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    #[serde(flatten)]
    pub candidate: FieldCandidate,

    /// False when any validation error names this field.
    pub valid: bool,
}

/// One processed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_type: DocType,

    /// Field name to surviving candidate.
    pub fields: BTreeMap<String, ExtractedField>,

    #[serde(rename = "validation_summary")]
    pub validation: ValidationSummary,
}

impl DocumentRecord {
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid()
    }

    /// Value of a field, if extracted.
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).and_then(|f| f.candidate.value.as_ref())
    }
}

/// Timing and OCR quality for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub processing_time_ms: f64,
    pub ocr_avg_confidence: f32,
}

/// Historical failure count for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCount {
    pub field: String,
    pub failure_count: u64,
}

/// Aggregate analytics attached to a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunAnalytics {
    pub top_failures: Vec<FailureCount>,
}

/// Externally visible result of one extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRun {
    pub request_id: Uuid,
    pub documents: Vec<DocumentRecord>,
    pub metrics: RunMetrics,
    pub analytics: RunAnalytics,
}
