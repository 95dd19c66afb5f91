//! Synthetic collaborators and fixture builders shared by the unit tests.

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::errors::{DomainError, DomainResult};
use super::assembler::{DocumentAssembler, PdfAssembler};
use super::compressors::{
    EncodeParams, EncodedPage, ExternalCompressor, ExternalToolSettings, PageColor, PageEncoder,
};
use super::rasterizer::{PageRaster, PageRasterizer};
use super::types::{PageEncoding, Subsampling, BYTES_PER_KB};

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageOutputFormat::Jpeg(85))
        .unwrap();
    out.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

/// A scanned-paperwork style PDF: one JPEG image per page at the given pixel sizes.
pub fn scanned_pdf(dims: &[(u32, u32)]) -> Vec<u8> {
    let pages: Vec<EncodedPage> = dims
        .iter()
        .enumerate()
        .map(|(index, &(width, height))| EncodedPage {
            index,
            width,
            height,
            color: PageColor::Rgb,
            encoding: PageEncoding::Lossy { quality: 85, subsampling: Subsampling::HighFidelity },
            bytes: jpeg_bytes(width, height),
        })
        .collect();
    PdfAssembler.assemble(&pages).unwrap()
}

/// Page with deterministic pseudo-random pixels, hard to compress.
pub fn noisy_page(index: usize, width: u32, height: u32) -> PageRaster {
    let mut state: u32 = 0x9E37_79B9 ^ (index as u32 + 1);
    let img = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    PageRaster::new(index, DynamicImage::ImageRgb8(img))
}

/// Page whose pixels are never looked at (synthetic encoder input).
pub fn blank_page(index: usize, width: u32, height: u32) -> PageRaster {
    PageRaster::new(index, DynamicImage::new_rgb8(width, height))
}

/// Size of a 4:2:0 page relative to 4:4:4.
pub const AGGRESSIVE_FACTOR: f64 = 0.75;

/// Encoder whose output length follows a closed-form size model.
///
/// Document size at quality `q`, scale `s`: `lossy_kb_at_100 * q/100 * s^2`, times
/// `AGGRESSIVE_FACTOR` for 4:2:0. Each page gets its share by pixel area. Lossless
/// pages weigh `lossless_kb * (1 + 0.05 * (9 - level))` by the same share.
pub struct SyntheticEncoder {
    lossy_kb_at_100: f64,
    lossless_kb: f64,
    total_area: u64,
    curve: Option<fn(u8) -> f64>,
    fail_quality: Option<(u8, DomainError)>,
    pub calls: AtomicUsize,
}

impl SyntheticEncoder {
    pub fn new(pages: &[PageRaster], lossy_kb_at_100: f64, lossless_kb: f64) -> Self {
        Self {
            lossy_kb_at_100,
            lossless_kb,
            total_area: pages.iter().map(PageRaster::area).sum::<u64>().max(1),
            curve: None,
            fail_quality: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Replace the linear quality model with an arbitrary document-size curve.
    pub fn with_curve(mut self, curve: fn(u8) -> f64) -> Self {
        self.curve = Some(curve);
        self
    }

    pub fn failing_at(mut self, quality: u8, error: DomainError) -> Self {
        self.fail_quality = Some((quality, error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageEncoder for SyntheticEncoder {
    fn encode(&self, page: &PageRaster, params: &EncodeParams) -> DomainResult<EncodedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let share = page.area() as f64 / self.total_area as f64;

        let document_kb = match params.encoding {
            PageEncoding::Lossy { quality, subsampling } => {
                if let Some((failing, ref error)) = self.fail_quality {
                    if failing == quality {
                        return Err(error.clone());
                    }
                }
                let base = match self.curve {
                    Some(curve) => curve(quality),
                    None => self.lossy_kb_at_100 * quality as f64 / 100.0,
                };
                let scale = params.scale as f64;
                let factor = match subsampling {
                    Subsampling::HighFidelity => 1.0,
                    Subsampling::Aggressive => AGGRESSIVE_FACTOR,
                };
                base * scale * scale * factor
            }
            PageEncoding::Lossless { level } => self.lossless_kb * (1.0 + 0.05 * (9 - level.min(9)) as f64),
        };

        let (width, height) = page.scaled_dimensions(params.scale);
        Ok(EncodedPage {
            index: page.index,
            width,
            height,
            color: if params.grayscale { PageColor::Gray } else { PageColor::Rgb },
            encoding: params.encoding,
            bytes: vec![0u8; (document_kb * share * BYTES_PER_KB).round() as usize],
        })
    }
}

/// Document size is the plain sum of page sizes.
#[derive(Debug, Default)]
pub struct SummingAssembler;

impl DocumentAssembler for SummingAssembler {
    fn assemble(&self, pages: &[EncodedPage]) -> DomainResult<Vec<u8>> {
        let mut ordered: Vec<&EncodedPage> = pages.iter().collect();
        ordered.sort_by_key(|p| p.index);
        Ok(ordered.iter().flat_map(|p| p.bytes.iter().copied()).collect())
    }

    fn measure(&self, pages: &[EncodedPage]) -> DomainResult<usize> {
        Ok(pages.iter().map(|p| p.bytes.len()).sum())
    }
}

/// Returns a fixed set of pages, or an extraction failure when empty.
pub struct FixedRasterizer {
    pages: Vec<PageRaster>,
    pub calls: AtomicUsize,
}

impl FixedRasterizer {
    pub fn new(pages: Vec<PageRaster>) -> Self {
        Self { pages, calls: AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageRasterizer for FixedRasterizer {
    fn rasterize(&self, _data: &[u8], _dpi: u32) -> DomainResult<Vec<PageRaster>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.pages.is_empty() {
            return Err(DomainError::Extraction("Synthetic document is corrupt".to_string()));
        }
        Ok(self.pages.clone())
    }
}

/// External tool that writes a zero-filled file of a scripted size.
pub struct ScriptedTool {
    available: bool,
    output: Result<usize, DomainError>,
    pub last_settings: Mutex<Option<ExternalToolSettings>>,
    pub calls: AtomicUsize,
}

impl ScriptedTool {
    pub fn producing_kb(kb: f64) -> Self {
        Self {
            available: true,
            output: Ok((kb * BYTES_PER_KB) as usize),
            last_settings: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: DomainError) -> Self {
        Self { output: Err(error), ..Self::producing_kb(0.0) }
    }

    pub fn unavailable() -> Self {
        Self { available: false, ..Self::producing_kb(0.0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExternalCompressor for ScriptedTool {
    fn is_available(&self) -> bool {
        self.available
    }

    fn version(&self) -> Option<&str> {
        self.available.then_some("9.99-scripted")
    }

    fn compress_file(&self, input: &Path, output: &Path, settings: &ExternalToolSettings) -> DomainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.exists(), "input must be staged before the tool runs");
        *self.last_settings.lock().unwrap() = Some(*settings);
        let size = self.output.clone()?;
        std::fs::write(output, vec![0u8; size])?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
