//! Error types for the idp-core library.

use thiserror::Error;

/// Main error type for the idp library.
///
/// Only input errors and unexpected stage failures surface through this type.
/// Validation failures are data, never errors.
#[derive(Error, Debug)]
pub enum IdpError {
    /// Page image conversion error.
    #[error("image source error: {0}")]
    Source(#[from] SourceError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Token assembly error.
    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while turning document bytes into page images.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// A page carries no decodable raster image.
    #[error("no decodable image on page {0}")]
    NoPageImage(u32),

    /// The bytes are not a supported raster image.
    #[error("unreadable image: {0}")]
    UnreadableImage(String),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors raised by the token assembler.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// The page sequence was empty.
    #[error("no page images to assemble")]
    EmptyInput,

    /// OCR failed on a specific page.
    #[error("OCR failed on page {page}: {source}")]
    Page {
        page: u32,
        #[source]
        source: OcrError,
    },
}

/// Errors from the optional model-backed enrichment step.
///
/// These never abort an extraction; the detector logs them and continues with
/// heuristic candidates only.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    /// The model could not be loaded.
    #[error("failed to load enrichment model: {0}")]
    ModelLoad(String),

    /// Inference failed.
    #[error("enrichment inference failed: {0}")]
    Inference(String),
}

/// Errors from the analytics sink.
///
/// These never abort an extraction; the orchestrator logs them and still returns
/// the result.
#[derive(Error, Debug)]
pub enum SinkError {
    /// SQLite storage error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// I/O error while preparing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink's internal lock was poisoned by a panicking writer.
    #[error("sink lock poisoned")]
    Poisoned,
}

/// Result type for the idp library.
pub type Result<T> = std::result::Result<T, IdpError>;
