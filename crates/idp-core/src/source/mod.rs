//! Page image sources: turning document bytes into an ordered set of page images.

mod image_file;
mod pdf;

pub use image_file::ImageFileSource;
pub use pdf::PdfImageSource;

use image::DynamicImage;
use sha2::{Digest, Sha256};

use crate::error::SourceError;

/// Result type for page conversion.
pub type Result<T> = std::result::Result<T, SourceError>;

/// A single page image.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based position in the document.
    pub index: usize,
    /// Page raster.
    pub image: DynamicImage,
}

/// Ordered page images of one document, identified by a checksum.
#[derive(Debug, Clone)]
pub struct PageSet {
    pub pages: Vec<PageImage>,
    /// Hex SHA-256 over the page pixel buffers in page order.
    pub checksum: String,
}

impl PageSet {
    /// Build a page set from images in document order.
    pub fn from_images(images: Vec<DynamicImage>) -> Self {
        let pages: Vec<PageImage> = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| PageImage { index, image })
            .collect();
        let checksum = checksum(&pages);
        Self { pages, checksum }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Trait for page image producers (PDF rasterizers, image decoders, scanners).
pub trait ImageSource: Send + Sync {
    /// Convert document bytes into page images at the requested DPI.
    fn convert(&self, document: &[u8], dpi: u32) -> Result<PageSet>;
}

/// Picks the PDF or raster decoder from the leading bytes of the document.
#[derive(Debug, Clone, Default)]
pub struct DocumentSource {
    pdf: PdfImageSource,
    image: ImageFileSource,
}

impl DocumentSource {
    pub fn new(max_pages: usize) -> Self {
        Self {
            pdf: PdfImageSource::new().with_max_pages(max_pages),
            image: ImageFileSource::new(),
        }
    }
}

impl ImageSource for DocumentSource {
    fn convert(&self, document: &[u8], dpi: u32) -> Result<PageSet> {
        if is_pdf(document) {
            self.pdf.convert(document, dpi)
        } else {
            self.image.convert(document, dpi)
        }
    }
}

/// PDF files start with `%PDF`, possibly after a few junk bytes.
pub fn is_pdf(document: &[u8]) -> bool {
    let head = &document[..document.len().min(1024)];
    head.windows(4).any(|w| w == b"%PDF")
}

fn checksum(pages: &[PageImage]) -> String {
    let mut hasher = Sha256::new();
    for page in pages {
        hasher.update(page.image.width().to_le_bytes());
        hasher.update(page.image.height().to_le_bytes());
        hasher.update(page.image.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn page(shade: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([shade])))
    }

    #[test]
    fn test_page_set_indexes_pages_in_order() {
        let set = PageSet::from_images(vec![page(0), page(255), page(128)]);

        assert_eq!(set.len(), 3);
        let indexes: Vec<usize> = set.pages.iter().map(|p| p.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(set.checksum.len(), 64);
    }

    #[test]
    fn test_pdf_sniffing() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(is_pdf(b"\xEF\xBB\xBF%PDF-1.4"));
        assert!(!is_pdf(b"\x89PNG\r\n"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn test_document_source_rejects_garbage() {
        let err = DocumentSource::new(0).convert(b"not a document", 300).unwrap_err();
        assert!(matches!(err, SourceError::UnreadableImage(_)));
    }

    #[test]
    fn test_checksum_depends_on_page_order() {
        let a = PageSet::from_images(vec![page(0), page(255)]);
        let b = PageSet::from_images(vec![page(255), page(0)]);
        let c = PageSet::from_images(vec![page(0), page(255)]);

        assert_ne!(a.checksum, b.checksum);
        assert_eq!(a.checksum, c.checksum);
    }
}
