//! Scanned PDF pages via their embedded raster images, using lopdf.

use std::borrow::Cow;

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, trace};

use super::{ImageSource, PageSet, Result};
use crate::error::SourceError;

/// Filters that carry a complete image codec rather than a byte transform.
const IMAGE_CODECS: [&[u8]; 4] = [b"DCTDecode", b"JPXDecode", b"CCITTFaxDecode", b"JBIG2Decode"];

/// Page source for scanned PDFs.
///
/// Each page of a scanned PDF carries its scan as an image XObject; the
/// largest decodable image on a page becomes that page's image. Pages are
/// not rasterized, so the requested DPI only applies to the scan itself.
#[derive(Debug, Clone, Default)]
pub struct PdfImageSource {
    /// Maximum pages to convert (0 = unlimited).
    max_pages: usize,
}

impl PdfImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of converted pages.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    fn load(data: &[u8]) -> Result<Document> {
        let mut doc = Document::load_mem(data).map_err(|e| SourceError::Parse(e.to_string()))?;

        // Scanners commonly emit PDFs encrypted with an empty user password
        if doc.is_encrypted() {
            doc.decrypt("").map_err(|_| SourceError::Encrypted)?;
            debug!("Decrypted PDF with empty password");
        }

        Ok(doc)
    }

    fn page_image(&self, doc: &Document, page: u32, page_id: ObjectId) -> Result<DynamicImage> {
        let scans: Vec<DynamicImage> = page_xobjects(doc, page_id)
            .into_iter()
            .filter_map(|stream| decode_scan(doc, stream))
            .collect();

        trace!("Page {} carries {} decodable images", page, scans.len());

        scans
            .into_iter()
            .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()))
            .ok_or(SourceError::NoPageImage(page))
    }
}

impl ImageSource for PdfImageSource {
    fn convert(&self, document: &[u8], dpi: u32) -> Result<PageSet> {
        let doc = Self::load(document)?;

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(SourceError::NoPages);
        }

        let limit = if self.max_pages == 0 {
            pages.len()
        } else {
            self.max_pages.min(pages.len())
        };

        debug!("Converting {} of {} PDF pages (dpi hint {})", limit, pages.len(), dpi);

        let images = pages
            .iter()
            .take(limit)
            .map(|(&page, &page_id)| self.page_image(&doc, page, page_id))
            .collect::<Result<Vec<_>>>()?;

        Ok(PageSet::from_images(images))
    }
}

/// Resources dictionary for a page, following inheritance up the page tree.
fn page_resources(doc: &Document, node_id: ObjectId) -> Option<&Dictionary> {
    let node = doc.get_dictionary(node_id).ok()?;

    match node.get(b"Resources") {
        Ok(resources) => doc.dereference(resources).ok()?.1.as_dict().ok(),
        Err(_) => page_resources(doc, node.get(b"Parent").ok()?.as_reference().ok()?),
    }
}

/// Image XObject streams reachable from a page's resources.
fn page_xobjects(doc: &Document, page_id: ObjectId) -> Vec<&Stream> {
    let Some(xobjects) = page_resources(doc, page_id)
        .and_then(|resources| resources.get(b"XObject").ok())
        .and_then(|xobjects| doc.dereference(xobjects).ok())
        .and_then(|(_, xobjects)| xobjects.as_dict().ok())
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, obj)| doc.dereference(obj).ok()?.1.as_stream().ok())
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .is_ok_and(|subtype| subtype == b"Image")
        })
        .collect()
}

/// How a scan's samples are stored in its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanEncoding {
    /// A complete JPEG file.
    Jpeg,
    /// Raw samples, possibly behind byte filters lopdf can undo.
    Raw,
    /// A codec we cannot decode.
    Unsupported,
}

impl ScanEncoding {
    fn of(dict: &Dictionary) -> Self {
        let filters: Vec<&[u8]> = match dict.get(b"Filter") {
            Ok(Object::Name(name)) => vec![name.as_slice()],
            Ok(Object::Array(items)) => items.iter().filter_map(|o| o.as_name().ok()).collect(),
            _ => Vec::new(),
        };

        match filters.as_slice() {
            [b"DCTDecode"] => ScanEncoding::Jpeg,
            chain if chain.iter().any(|name| IMAGE_CODECS.contains(name)) => ScanEncoding::Unsupported,
            _ => ScanEncoding::Raw,
        }
    }
}

/// Sample layout of a raw 8-bit scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPixels {
    Gray,
    Rgb,
}

impl ScanPixels {
    /// Layout from the image dictionary; scans without a colour space are
    /// taken as RGB.
    fn of(doc: &Document, dict: &Dictionary) -> Option<Self> {
        let bits = dict.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8);
        if bits != 8 {
            trace!("Unsupported bits per component: {}", bits);
            return None;
        }

        match dict.get(b"ColorSpace") {
            Ok(space) => Self::from_color_space(doc, doc.dereference(space).ok()?.1),
            Err(_) => Some(ScanPixels::Rgb),
        }
    }

    fn from_color_space(doc: &Document, space: &Object) -> Option<Self> {
        let (family, params) = match space {
            Object::Name(name) => (name.as_slice(), None),
            Object::Array(items) => (items.first()?.as_name().ok()?, items.get(1)),
            _ => return None,
        };

        match family {
            b"DeviceGray" | b"G" | b"CalGray" => Some(ScanPixels::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(ScanPixels::Rgb),
            b"ICCBased" => {
                let profile = doc.dereference(params?).ok()?.1.as_stream().ok()?;
                match profile.dict.get(b"N").and_then(Object::as_i64).ok()? {
                    1 => Some(ScanPixels::Gray),
                    3 => Some(ScanPixels::Rgb),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn channels(self) -> usize {
        match self {
            ScanPixels::Gray => 1,
            ScanPixels::Rgb => 3,
        }
    }

    fn to_image(self, samples: &[u8], width: u32, height: u32) -> Option<DynamicImage> {
        let needed = width as usize * height as usize * self.channels();
        if samples.len() < needed {
            trace!("Truncated image data: {} < {}", samples.len(), needed);
            return None;
        }

        let samples = samples[..needed].to_vec();
        match self {
            ScanPixels::Gray => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
            ScanPixels::Rgb => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        }
    }
}

fn decode_scan(doc: &Document, stream: &Stream) -> Option<DynamicImage> {
    let dict = &stream.dict;
    let dimension = |key: &[u8]| {
        dict.get(key)
            .and_then(Object::as_i64)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|&v| v > 0)
    };
    let (width, height) = (dimension(b"Width")?, dimension(b"Height")?);

    match ScanEncoding::of(dict) {
        ScanEncoding::Jpeg => image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg).ok(),
        ScanEncoding::Raw => {
            let pixels = ScanPixels::of(doc, dict)?;
            let samples = match stream.decompressed_content() {
                Ok(data) => Cow::Owned(data),
                Err(_) => Cow::Borrowed(stream.content.as_slice()),
            };
            pixels.to_image(&samples, width, height)
        }
        ScanEncoding::Unsupported => {
            trace!("Skipping {}x{} image with an unsupported codec", width, height);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn name(value: &str) -> Object {
        Object::Name(value.as_bytes().to_vec())
    }

    /// A one-page PDF whose page carries the given image XObjects.
    fn scanned_pdf(images: Vec<Stream>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut xobjects = Dictionary::new();
        for (idx, image) in images.into_iter().enumerate() {
            xobjects.set(format!("Im{}", idx), doc.add_object(image));
        }
        let resources_id = doc.add_object(dictionary! { "XObject" => xobjects });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn gray_scan(width: i64, height: i64, samples: Vec<u8>) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            samples,
        )
    }

    #[test]
    fn test_rejects_non_pdf_bytes() {
        let source = PdfImageSource::new();
        let err = source.convert(b"definitely not a pdf", 300).unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_largest_scan_becomes_the_page() {
        let pdf = scanned_pdf(vec![gray_scan(1, 1, vec![9]), gray_scan(2, 2, vec![0, 64, 128, 255])]);
        let pages = PdfImageSource::new().convert(&pdf, 300).unwrap();

        assert_eq!(pages.len(), 1);
        let image = &pages.pages[0].image;
        assert_eq!((image.width(), image.height()), (2, 2));
        assert_eq!(image.to_rgba8().get_pixel(1, 0).0, [64, 64, 64, 255]);
    }

    #[test]
    fn test_page_without_scan_is_an_error() {
        let pdf = scanned_pdf(vec![gray_scan(2, 2, vec![0])]);
        let err = PdfImageSource::new().convert(&pdf, 300).unwrap_err();
        assert!(matches!(err, SourceError::NoPageImage(1)));
    }

    #[test]
    fn test_encoding_from_filters() {
        let encoding = |filter: Object| ScanEncoding::of(&dictionary! { "Filter" => filter });

        assert_eq!(encoding(name("DCTDecode")), ScanEncoding::Jpeg);
        assert_eq!(encoding(name("FlateDecode")), ScanEncoding::Raw);
        assert_eq!(encoding(name("JBIG2Decode")), ScanEncoding::Unsupported);
        assert_eq!(
            encoding(Object::Array(vec![name("FlateDecode"), name("DCTDecode")])),
            ScanEncoding::Unsupported
        );
        assert_eq!(ScanEncoding::of(&Dictionary::new()), ScanEncoding::Raw);
    }

    #[test]
    fn test_pixels_from_color_space() {
        let doc = Document::with_version("1.5");
        let pixels = |space: Object| ScanPixels::from_color_space(&doc, &space);

        assert_eq!(pixels(name("DeviceGray")), Some(ScanPixels::Gray));
        assert_eq!(pixels(name("DeviceRGB")), Some(ScanPixels::Rgb));
        assert_eq!(pixels(name("DeviceCMYK")), None);
        assert_eq!(
            pixels(Object::Array(vec![name("CalRGB"), Object::Dictionary(Dictionary::new())])),
            Some(ScanPixels::Rgb)
        );

        let sixteen_bit = dictionary! { "BitsPerComponent" => 16 };
        assert_eq!(ScanPixels::of(&doc, &sixteen_bit), None);
        assert_eq!(ScanPixels::of(&doc, &Dictionary::new()), Some(ScanPixels::Rgb));
    }

    #[test]
    fn test_icc_profile_channel_count() {
        let mut doc = Document::with_version("1.5");
        let profile = doc.add_object(Stream::new(dictionary! { "N" => 1 }, Vec::new()));
        let space = Object::Array(vec![name("ICCBased"), Object::Reference(profile)]);

        assert_eq!(ScanPixels::from_color_space(&doc, &space), Some(ScanPixels::Gray));
    }

    #[test]
    fn test_truncated_samples_are_rejected() {
        assert!(ScanPixels::Rgb.to_image(&[0, 0, 0], 2, 2).is_none());
        let gray = ScanPixels::Gray.to_image(&[1, 2, 3, 4, 5], 2, 2).unwrap();
        assert_eq!((gray.width(), gray.height()), (2, 2));
    }
}
