//! Deterministic collaborators for unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use image::DynamicImage;
use uuid::Uuid;

use crate::analytics::AnalyticsSink;
use crate::error::{EnrichmentError, OcrError, SinkError};
use crate::extraction::FieldModel;
use crate::models::config::OcrConfig;
use crate::models::document::{
    AssembledDocument, BBox, DocType, DocumentRecord, ExtractedField, ExtractionRun, FailureCount,
    FieldCandidate, RunAnalytics, RunMetrics,
};
use crate::ocr::{OcrEngine, OcrToken, TokenAssembler};
use crate::source::{self, ImageSource, PageImage, PageSet};
use crate::validation::ValidationSummary;

/// OCR engine that "recognizes" a fixed text per page.
///
/// Each line of a page's text becomes an OCR line, each whitespace-separated
/// word a token with a synthetic box.
pub struct ScriptedOcr {
    pages: Vec<String>,
    reported_page: Option<u32>,
    confidences: Option<Vec<f32>>,
    failing_page: Option<u32>,
}

impl ScriptedOcr {
    pub fn new<S: Into<String>>(pages: Vec<S>) -> Self {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
            reported_page: None,
            confidences: None,
            failing_page: None,
        }
    }

    /// Report this page number on every token instead of the real one.
    pub fn reporting_page(mut self, page: u32) -> Self {
        self.reported_page = Some(page);
        self
    }

    /// Per-token confidences, indexed across all pages in order.
    pub fn with_confidences(mut self, confidences: Vec<f32>) -> Self {
        self.confidences = Some(confidences);
        self
    }

    /// Fail recognition of the given 1-based page.
    pub fn failing_on(mut self, page: u32) -> Self {
        self.failing_page = Some(page);
        self
    }

    fn words_before(&self, index: usize) -> usize {
        self.pages[..index.min(self.pages.len())]
            .iter()
            .map(|text| text.split_whitespace().count())
            .sum()
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, page: &PageImage, _languages: &[String]) -> Result<Vec<OcrToken>, OcrError> {
        let page_num = page.index as u32 + 1;
        if self.failing_page == Some(page_num) {
            return Err(OcrError::Recognition(format!("scripted failure on page {page_num}")));
        }

        let text = self.pages.get(page.index).map(String::as_str).unwrap_or("");
        let mut global = self.words_before(page.index);
        let mut tokens = Vec::new();

        for (line, line_text) in text.lines().enumerate() {
            for (col, word) in line_text.split_whitespace().enumerate() {
                let confidence = self
                    .confidences
                    .as_ref()
                    .and_then(|c| c.get(global).copied())
                    .unwrap_or(0.9);
                let (x0, y0) = (col as f32 * 100.0, line as f32 * 20.0);
                tokens.push(OcrToken {
                    text: word.to_string(),
                    confidence,
                    bbox: BBox::new(x0, y0, x0 + 90.0, y0 + 16.0),
                    page_num: self.reported_page.unwrap_or(page_num),
                    line: line as u32,
                });
                global += 1;
            }
        }

        Ok(tokens)
    }
}

/// `n` small blank page images.
pub fn blank_pages(n: usize) -> Vec<PageImage> {
    (0..n)
        .map(|index| PageImage {
            index,
            image: DynamicImage::new_luma8(8, 8),
        })
        .collect()
}

/// Assemble page texts through the scripted OCR engine.
pub fn assembled(pages: &[&str]) -> AssembledDocument {
    TokenAssembler::new(Arc::new(ScriptedOcr::new(pages.to_vec())), &OcrConfig::default())
        .assemble(&blank_pages(pages.len()))
        .unwrap()
}

/// Image source that ignores the document bytes and yields blank pages.
pub struct BlankSource {
    pages: usize,
}

impl BlankSource {
    pub fn new(pages: usize) -> Self {
        Self { pages }
    }
}

impl ImageSource for BlankSource {
    fn convert(&self, _document: &[u8], _dpi: u32) -> source::Result<PageSet> {
        Ok(PageSet::from_images(
            blank_pages(self.pages).into_iter().map(|p| p.image).collect(),
        ))
    }
}

/// Field model returning fixed candidates, or always failing.
pub struct ScriptedModel {
    candidates: Option<Vec<FieldCandidate>>,
}

impl ScriptedModel {
    pub fn returning(candidates: Vec<FieldCandidate>) -> Self {
        Self {
            candidates: Some(candidates),
        }
    }

    pub fn failing() -> Self {
        Self { candidates: None }
    }
}

impl FieldModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn infer(&self, _full_text: &str, _pages: &[PageImage]) -> Result<Vec<FieldCandidate>, EnrichmentError> {
        self.candidates
            .clone()
            .ok_or_else(|| EnrichmentError::Inference("scripted failure".to_string()))
    }
}

/// Sink whose every operation fails.
pub struct FailingSink;

impl AnalyticsSink for FailingSink {
    fn persist(&self, _run: &ExtractionRun) -> Result<(), SinkError> {
        Err(SinkError::Poisoned)
    }

    fn top_failures(&self, _limit: usize) -> Result<Vec<FailureCount>, SinkError> {
        Err(SinkError::Poisoned)
    }
}

/// A run with one document per entry; fields given as `(name, value, valid)`.
pub fn run_with(documents: &[(DocType, &[(&str, &str, bool)])]) -> ExtractionRun {
    ExtractionRun {
        request_id: Uuid::new_v4(),
        documents: documents
            .iter()
            .map(|(doc_type, fields)| DocumentRecord {
                doc_type: *doc_type,
                fields: fields
                    .iter()
                    .map(|(name, value, valid)| {
                        let field = ExtractedField {
                            candidate: FieldCandidate::heuristic(*name, *value, 0.6),
                            valid: *valid,
                        };
                        (name.to_string(), field)
                    })
                    .collect::<BTreeMap<_, _>>(),
                validation: ValidationSummary::default(),
            })
            .collect(),
        metrics: RunMetrics::default(),
        analytics: RunAnalytics::default(),
    }
}
