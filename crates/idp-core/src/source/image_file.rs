//! Single raster images (PNG, JPEG, TIFF, ...) as one-page documents.

use tracing::debug;

use super::{ImageSource, PageSet, Result};
use crate::error::SourceError;

/// Page source that decodes the document bytes as a single image.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileSource;

impl ImageFileSource {
    pub fn new() -> Self {
        Self
    }
}

impl ImageSource for ImageFileSource {
    fn convert(&self, document: &[u8], _dpi: u32) -> Result<PageSet> {
        let image = image::load_from_memory(document)
            .map_err(|e| SourceError::UnreadableImage(e.to_string()))?;

        debug!("Decoded image {}x{}", image.width(), image.height());

        Ok(PageSet::from_images(vec![image]))
    }
}
