//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the idp pipeline.
///
/// Passed explicitly into each component at construction; nothing reads
/// configuration from global state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdpConfig {
    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Layout model (enrichment) configuration.
    pub layout: LayoutConfig,

    /// Validation configuration.
    pub validation: ValidationConfig,

    /// Analytics storage configuration.
    pub storage: StorageConfig,
}

/// OCR and page conversion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Language packs handed to the OCR engine.
    pub languages: Vec<String>,

    /// DPI for rendering PDF pages to images.
    pub dpi: u32,

    /// Maximum pages to process (0 = unlimited).
    pub max_pages: usize,

    /// Recognize pages on separate threads.
    pub parallel_pages: bool,

    /// Directory containing OCR model files.
    pub model_dir: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: vec!["eng".to_string()],
            dpi: 300,
            max_pages: 0,
            parallel_pages: false,
            model_dir: PathBuf::from("models"),
        }
    }
}

/// Optional layout model used to enrich heuristic field detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Try to load the layout model at startup.
    pub enabled: bool,

    /// Model file path.
    pub model_path: Option<PathBuf>,

    /// Minimum confidence for a model candidate to replace a heuristic one.
    pub confidence_threshold: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_path: None,
            confidence_threshold: 0.5,
        }
    }
}

/// Cross-field validation toggles. Pattern rules are always applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Check subtotal + tax == total.
    pub enforce_totals: bool,

    /// Check invoice/due and birth/expiry date ordering.
    pub enforce_dates: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enforce_totals: true,
            enforce_dates: true,
        }
    }
}

/// Analytics storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path (None disables persistence).
    pub database_path: Option<PathBuf>,

    /// Number of fields reported in `top_failures`.
    pub top_failures_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: Some(PathBuf::from("data/idp.sqlite")),
            top_failures_limit: 20,
        }
    }
}

impl IdpConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
