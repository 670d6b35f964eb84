//! Optional model-backed field enrichment.
//!
//! The detector always runs the heuristic rules and merges whatever the
//! enrichment strategy returns. A missing or broken model degrades to
//! [`Enrichment::None`] and never fails an extraction.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::EnrichmentError;
use crate::models::config::LayoutConfig;
use crate::models::document::{CandidateSource, FieldCandidate};
use crate::source::PageImage;

/// A model that proposes field candidates from text and page images.
pub trait FieldModel: Send + Sync {
    /// Model name for logs.
    fn name(&self) -> &str;

    /// Propose candidates for any fields the model recognizes.
    fn infer(&self, full_text: &str, pages: &[PageImage]) -> Result<Vec<FieldCandidate>, EnrichmentError>;
}

/// Enrichment strategy.
#[derive(Default)]
pub enum Enrichment {
    /// Heuristic-only extraction.
    #[default]
    None,
    /// Candidates from a loaded model.
    Model(Box<dyn FieldModel>),
}

impl Enrichment {
    /// Load the configured model, falling back to [`Enrichment::None`] when
    /// enrichment is disabled, unconfigured, or the loader fails.
    pub fn load<F>(config: &LayoutConfig, loader: F) -> Self
    where
        F: FnOnce(&Path) -> Result<Box<dyn FieldModel>, EnrichmentError>,
    {
        if !config.enabled {
            debug!("Layout enrichment disabled");
            return Enrichment::None;
        }

        let Some(path) = config.model_path.as_deref() else {
            warn!("Layout enrichment enabled without a model path, using heuristics only");
            return Enrichment::None;
        };

        match loader(path) {
            Ok(model) => {
                info!("Loaded layout model '{}' from {}", model.name(), path.display());
                Enrichment::Model(model)
            }
            Err(e) => {
                warn!("Layout model unavailable ({}), using heuristics only", e);
                Enrichment::None
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Enrichment::Model(_))
    }

    /// Model candidates, all tagged with source `model`. Inference errors are
    /// logged and yield no candidates.
    pub fn infer(&self, full_text: &str, pages: &[PageImage]) -> Vec<FieldCandidate> {
        let Enrichment::Model(model) = self else {
            return Vec::new();
        };

        match model.infer(full_text, pages) {
            Ok(candidates) => {
                debug!("Model '{}' proposed {} candidates", model.name(), candidates.len());
                candidates
                    .into_iter()
                    .map(|c| FieldCandidate {
                        source: CandidateSource::Model,
                        ..c
                    })
                    .collect()
            }
            Err(e) => {
                warn!("Model '{}' inference failed: {}", model.name(), e);
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for Enrichment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Enrichment::None => f.write_str("Enrichment::None"),
            Enrichment::Model(model) => write!(f, "Enrichment::Model({})", model.name()),
        }
    }
}
