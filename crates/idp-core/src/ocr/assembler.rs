//! Merges per-page OCR output into one ordered token stream.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::AssemblyError;
use crate::models::config::OcrConfig;
use crate::models::document::{AssembledDocument, Token};
use crate::source::PageImage;

use super::{OcrEngine, OcrToken};

/// Runs OCR once per page and assembles the document text.
pub struct TokenAssembler {
    engine: Arc<dyn OcrEngine>,
    languages: Vec<String>,
    parallel_pages: bool,
}

impl TokenAssembler {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &OcrConfig) -> Self {
        Self {
            engine,
            languages: config.languages.clone(),
            parallel_pages: config.parallel_pages,
        }
    }

    /// Recognize every page and merge the results in page order.
    ///
    /// Token page numbers are overwritten with the 1-based position of their
    /// page in `pages`. Empty pages still contribute an (empty) line of text.
    pub fn assemble(&self, pages: &[PageImage]) -> Result<AssembledDocument, AssemblyError> {
        if pages.is_empty() {
            return Err(AssemblyError::EmptyInput);
        }

        let per_page = if self.parallel_pages && pages.len() > 1 {
            self.recognize_parallel(pages)?
        } else {
            self.recognize_sequential(pages)?
        };

        let mut tokens = Vec::new();
        let mut full_text = String::new();
        let mut page_spans = Vec::with_capacity(pages.len());

        for (idx, ocr_tokens) in per_page.into_iter().enumerate() {
            let page = idx as u32 + 1;

            if idx > 0 {
                full_text.push('\n');
            }
            let start = full_text.len();
            let page_tokens = normalize_page(ocr_tokens, page);
            full_text.push_str(&page_text(&page_tokens));
            page_spans.push(start..full_text.len());

            debug!("Page {}: {} tokens", page, page_tokens.len());
            tokens.extend(page_tokens);
        }

        let avg_confidence = if tokens.is_empty() {
            0.0
        } else {
            let sum: f64 = tokens.iter().map(|t| f64::from(t.confidence)).sum();
            (sum / tokens.len() as f64) as f32
        };

        info!(
            "Assembled {} tokens from {} pages (avg confidence {:.2})",
            tokens.len(),
            pages.len(),
            avg_confidence
        );

        Ok(AssembledDocument {
            tokens,
            full_text,
            page_count: pages.len(),
            avg_confidence,
            page_spans,
        })
    }

    fn recognize_page(&self, page: &PageImage) -> Result<Vec<OcrToken>, AssemblyError> {
        self.engine
            .recognize(page, &self.languages)
            .map_err(|source| AssemblyError::Page {
                page: page.index as u32 + 1,
                source,
            })
    }

    fn recognize_sequential(&self, pages: &[PageImage]) -> Result<Vec<Vec<OcrToken>>, AssemblyError> {
        pages.iter().map(|page| self.recognize_page(page)).collect()
    }

    /// Pages are recognized on the rayon pool; `collect` keeps input order,
    /// so completion order never affects the output.
    fn recognize_parallel(&self, pages: &[PageImage]) -> Result<Vec<Vec<OcrToken>>, AssemblyError> {
        pages.par_iter().map(|page| self.recognize_page(page)).collect()
    }
}

fn normalize_page(ocr_tokens: Vec<OcrToken>, page: u32) -> Vec<Token> {
    ocr_tokens
        .into_iter()
        .filter_map(|t| {
            let text = t.text.trim();
            if text.is_empty() {
                return None;
            }
            Some(Token {
                text: text.to_string(),
                confidence: t.confidence.clamp(0.0, 1.0),
                bbox: t.bbox,
                page,
                line: t.line,
            })
        })
        .collect()
}

/// Words on the same line joined by spaces, lines joined by newlines.
fn page_text(tokens: &[Token]) -> String {
    let mut text = String::new();
    let mut current_line = None;

    for token in tokens {
        match current_line {
            Some(line) if line == token.line => text.push(' '),
            Some(_) => text.push('\n'),
            None => {}
        }
        text.push_str(&token.text);
        current_line = Some(token.line);
    }

    text
}
