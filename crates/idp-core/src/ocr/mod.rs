//! OCR collaborator interface and token assembly.

mod assembler;
#[cfg(feature = "native")]
mod pure_engine;

pub use assembler::TokenAssembler;
#[cfg(feature = "native")]
pub use pure_engine::PureOcrEngine;

use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::models::document::BBox;
use crate::source::PageImage;

/// A word recognized by an OCR engine, before page numbers are normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrToken {
    /// Recognized text.
    pub text: String,

    /// Recognition confidence (0.0 - 1.0). Engines may report out-of-range
    /// values for unrecognized regions; the assembler clamps them.
    pub confidence: f32,

    /// Bounding box in page pixel space.
    pub bbox: BBox,

    /// Page number as reported by the engine. Not trusted.
    pub page_num: u32,

    /// Line index within the page.
    pub line: u32,
}

/// Trait for OCR engines.
pub trait OcrEngine: Send + Sync {
    /// Recognize the words on one page image.
    fn recognize(&self, page: &PageImage, languages: &[String]) -> Result<Vec<OcrToken>, OcrError>;
}
