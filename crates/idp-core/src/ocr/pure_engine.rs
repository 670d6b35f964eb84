//! Pure Rust OCR engine wrapper using `pure-onnx-ocr`.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::OcrError;
use crate::models::document::BBox;
use crate::source::PageImage;

use super::{OcrEngine, OcrToken};

/// Rows closer than this (in pixels) are read as one line.
const ROW_HEIGHT: f32 = 20.0;

/// OCR engine backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).
///
/// The engine recognizes text regions; regions are split into word tokens
/// whose boxes divide the region width by character count. Recognition
/// calls are serialized on the underlying engine.
pub struct PureOcrEngine {
    engine: Mutex<pure_onnx_ocr::engine::OcrEngine>,
}

impl PureOcrEngine {
    /// Create an engine from model files in a directory.
    pub fn from_dir(model_dir: &Path) -> Result<Self, OcrError> {
        let det_path = model_dir.join("det.onnx");
        let rec_path = model_dir.join("latin_rec.onnx");
        let dict_path = model_dir.join("latin_dict.txt");

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!("missing {}", path.display())));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());

        Ok(Self {
            engine: Mutex::new(engine),
        })
    }
}

impl OcrEngine for PureOcrEngine {
    fn recognize(&self, page: &PageImage, languages: &[String]) -> Result<Vec<OcrToken>, OcrError> {
        let start = Instant::now();
        let (width, height) = (page.image.width(), page.image.height());
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidImage(format!("page {} is empty", page.index + 1)));
        }

        debug!(
            "Recognizing page {} ({}x{}, languages {:?})",
            page.index + 1,
            width,
            height,
            languages
        );

        let results = self
            .engine
            .lock()
            .map_err(|_| OcrError::Recognition("OCR engine lock poisoned".to_string()))?
            .run_from_image(&page.image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;

        let mut regions: Vec<(BBox, String, f32)> = results
            .iter()
            .map(|r| (polygon_to_bbox(&r.bounding_box), r.text.replace("[UNK]", " "), r.confidence))
            .collect();

        // Reading order: rows top to bottom, then left to right
        regions.sort_by(|a, b| {
            let row_a = (a.0.y0 / ROW_HEIGHT) as i32;
            let row_b = (b.0.y0 / ROW_HEIGHT) as i32;
            row_a
                .cmp(&row_b)
                .then(a.0.x0.partial_cmp(&b.0.x0).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut tokens = Vec::new();
        let mut line = 0u32;
        let mut last_row = None;

        for (bbox, text, confidence) in regions {
            let row = (bbox.y0 / ROW_HEIGHT) as i32;
            if last_row.is_some_and(|r| r != row) {
                line += 1;
            }
            last_row = Some(row);

            tokens.extend(split_region(&text, bbox, confidence, page.index as u32 + 1, line));
        }

        debug!(
            "Page {}: {} tokens in {}ms",
            page.index + 1,
            tokens.len(),
            start.elapsed().as_millis()
        );

        Ok(tokens)
    }
}

/// Split a recognized region into word tokens with proportional boxes.
fn split_region(text: &str, bbox: BBox, confidence: f32, page_num: u32, line: u32) -> Vec<OcrToken> {
    let total_chars = text.chars().count().max(1) as f32;
    let char_width = bbox.width() / total_chars;

    let mut tokens = Vec::new();
    let mut offset = 0usize;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if idx > offset {
                tokens.push(word_token(text, offset, idx, bbox, char_width, confidence, page_num, line));
            }
            offset = idx + ch.len_utf8();
        }
    }
    if offset < text.len() {
        tokens.push(word_token(text, offset, text.len(), bbox, char_width, confidence, page_num, line));
    }
    tokens
}

#[allow(clippy::too_many_arguments)]
fn word_token(
    text: &str,
    start: usize,
    end: usize,
    bbox: BBox,
    char_width: f32,
    confidence: f32,
    page_num: u32,
    line: u32,
) -> OcrToken {
    let chars_before = text[..start].chars().count() as f32;
    let word_chars = text[start..end].chars().count() as f32;
    let x0 = bbox.x0 + chars_before * char_width;

    OcrToken {
        text: text[start..end].to_string(),
        confidence,
        bbox: BBox::new(x0, bbox.y0, x0 + word_chars * char_width, bbox.y1),
        page_num,
        line,
    }
}

/// Axis-aligned bounds of a detection polygon.
fn polygon_to_bbox(polygon: &pure_onnx_ocr::Polygon<f64>) -> BBox {
    let mut bbox = BBox::new(f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
    for coord in polygon.exterior().coords() {
        bbox.x0 = bbox.x0.min(coord.x as f32);
        bbox.y0 = bbox.y0.min(coord.y as f32);
        bbox.x1 = bbox.x1.max(coord.x as f32);
        bbox.y1 = bbox.y1.max(coord.y as f32);
    }
    if bbox.x0.is_finite() { bbox } else { BBox::default() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_region_into_words() {
        let tokens = split_region("Total Due: 108.00", BBox::new(0.0, 10.0, 170.0, 30.0), 0.9, 1, 4);

        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["Total", "Due:", "108.00"]);
        assert!(tokens.iter().all(|t| t.line == 4 && t.page_num == 1));

        // 17 chars over 170px
        assert_eq!(tokens[0].bbox.x0, 0.0);
        assert_eq!(tokens[0].bbox.x1, 50.0);
        assert_eq!(tokens[2].bbox.x0, 110.0);
    }

    #[test]
    fn test_split_region_collapses_runs_of_spaces() {
        let tokens = split_region("  a   b ", BBox::default(), 0.5, 1, 0);
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_models_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PureOcrEngine::from_dir(dir.path()),
            Err(OcrError::ModelLoad(_))
        ));
    }
}
