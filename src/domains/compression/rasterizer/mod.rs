//! Page rasterization: turns an input document into one pixel surface per page.

#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod embedded;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;

use crate::errors::{DomainError, DomainResult};

/// Largest page edge in pixels, for rendered, decoded and extracted pages alike.
pub const MAX_DIMENSION_PX: u32 = 4096;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// One page of the input as a raster surface
#[derive(Debug, Clone)]
pub struct PageRaster {
    /// 0-based position in the source document
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub pixels: DynamicImage,
}

impl PageRaster {
    pub fn new(index: usize, pixels: DynamicImage) -> Self {
        let (width, height) = pixels.dimensions();
        Self { index, width, height, pixels }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Pixel dimensions after applying `scale`, never below 1x1.
    pub fn scaled_dimensions(&self, scale: f32) -> (u32, u32) {
        if (scale - 1.0).abs() < f32::EPSILON {
            return (self.width, self.height);
        }
        let w = ((self.width as f32 * scale).round() as u32).max(1);
        let h = ((self.height as f32 * scale).round() as u32).max(1);
        (w, h)
    }
}

/// What kind of document the input bytes hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

/// Sniff the input by magic bytes.
pub fn detect_input_kind(data: &[u8]) -> DomainResult<InputKind> {
    let kind = infer::get(data)
        .ok_or_else(|| DomainError::Extraction("Unrecognised input format".to_string()))?;
    let mime_type: mime::Mime = kind
        .mime_type()
        .parse()
        .map_err(|_| DomainError::Extraction(format!("Invalid MIME type: {}", kind.mime_type())))?;

    if mime_type == mime::APPLICATION_PDF {
        Ok(InputKind::Pdf)
    } else if mime_type.type_() == mime::IMAGE {
        Ok(InputKind::Image)
    } else {
        Err(DomainError::Extraction(format!("Unsupported input type: {}", mime_type)))
    }
}

/// Page rasterization capability (allows mocking for tests)
pub trait PageRasterizer: Send + Sync {
    /// Rasterize every page at `dpi`, in document order. Any failure is fatal for the call.
    fn rasterize(&self, data: &[u8], dpi: u32) -> DomainResult<Vec<PageRaster>>;
}

/// Default rasterizer: images decode to a single page, PDFs render through PDFium
/// and fall back to their embedded page images when PDFium cannot be loaded.
#[derive(Debug, Clone, Default)]
pub struct DocumentRasterizer {
    pdfium_library_path: Option<String>,
}

impl DocumentRasterizer {
    pub fn new(pdfium_library_path: Option<String>) -> Self {
        Self { pdfium_library_path }
    }

    fn rasterize_pdf(&self, data: &[u8], dpi: u32) -> DomainResult<Vec<PageRaster>> {
        #[cfg(feature = "pdfium")]
        {
            match pdfium::render_pages(data, dpi, self.pdfium_library_path.as_deref()) {
                Ok(pages) => return Ok(pages),
                Err(DomainError::ToolUnavailable(reason)) => {
                    log::warn!("PDFium unavailable ({}), extracting embedded page images instead", reason);
                }
                Err(e) => return Err(e),
            }
        }
        #[cfg(not(feature = "pdfium"))]
        {
            let _ = (dpi, &self.pdfium_library_path);
        }

        embedded::extract_pages(data)
    }
}

impl PageRasterizer for DocumentRasterizer {
    fn rasterize(&self, data: &[u8], dpi: u32) -> DomainResult<Vec<PageRaster>> {
        let pages = match detect_input_kind(data)? {
            InputKind::Image => vec![decode_image_page(data)?],
            InputKind::Pdf => self.rasterize_pdf(data, dpi)?,
        };

        if pages.is_empty() {
            return Err(DomainError::Extraction("Document has no pages".to_string()));
        }
        log::debug!("Rasterized {} page(s) at {} DPI", pages.len(), dpi);
        Ok(pages)
    }
}

/// Decode a raster image input as page 0, honouring its EXIF orientation.
pub fn decode_image_page(data: &[u8]) -> DomainResult<PageRaster> {
    let image = image::load_from_memory(data)
        .map_err(|e| DomainError::Extraction(format!("Failed to decode image: {}", e)))?;
    let oriented = apply_orientation(image, read_exif_orientation(data));
    Ok(PageRaster::new(0, cap_dimensions(DynamicImage::ImageRgb8(oriented.to_rgb8()))))
}

/// Downsample so the long edge fits `MAX_DIMENSION_PX`, keeping the aspect ratio.
/// Decoded pixels have no DPI to render at, so this is their only size bound.
pub fn cap_dimensions(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width.max(height) <= MAX_DIMENSION_PX {
        return image;
    }
    log::debug!("Downsampling {}x{} page to a {} px long edge", width, height, MAX_DIMENSION_PX);
    image.resize(MAX_DIMENSION_PX, MAX_DIMENSION_PX, FilterType::Lanczos3)
}

/// EXIF orientation tag, 1 (normal) when absent.
pub fn read_exif_orientation(data: &[u8]) -> u32 {
    let mut cursor = Cursor::new(data);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Pixel size of a page rendered at `dpi`, long edge capped at `MAX_DIMENSION_PX`.
pub fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}
