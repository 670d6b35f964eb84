//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod extract;
pub mod failures;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use idp_core::error::EnrichmentError;
use idp_core::{Enrichment, ExtractionPipeline, IdpConfig};

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("idp")
        .join("config.json")
}

/// Load the configuration from `--config`, the default location, or defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<IdpConfig> {
    if let Some(path) = config_path {
        return IdpConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to read config file {}", path));
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Using config file {}", default_path.display());
        IdpConfig::from_file(&default_path)
            .with_context(|| format!("Failed to read config file {}", default_path.display()))
    } else {
        Ok(IdpConfig::default())
    }
}

/// Build a pipeline with the native OCR engine and the configured sink.
pub fn build_pipeline(config: IdpConfig) -> anyhow::Result<ExtractionPipeline> {
    let model_dir = config.ocr.model_dir.clone();
    let enrichment = Enrichment::load(&config.layout, |path| {
        Err(EnrichmentError::ModelLoad(format!(
            "no layout model runtime is available for {}",
            path.display()
        )))
    });

    ExtractionPipeline::builder(config)
        .enrichment(enrichment)
        .build()
        .with_context(|| format!("Failed to initialize pipeline (OCR models in {})", model_dir.display()))
}
