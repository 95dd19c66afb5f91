//! Encoders and external compressors used by the engine

pub mod image_compressor;
pub mod pdf_compressor;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::DomainResult;
use super::rasterizer::PageRaster;
use super::types::{PageEncoding, PdfPreset};

/// Sample layout of an encoded page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageColor {
    Rgb,
    Gray,
}

impl PageColor {
    /// PDF colour space name
    pub fn color_space(&self) -> &'static str {
        match self {
            PageColor::Rgb => "DeviceRGB",
            PageColor::Gray => "DeviceGray",
        }
    }
}

/// Parameters for a single page encode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeParams {
    pub encoding: PageEncoding,
    /// Applied before encoding, 1.0 keeps the raster size
    pub scale: f32,
    pub grayscale: bool,
    pub contrast_boost: f32,
}

/// One page after encoding
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub index: usize,
    /// Pixel size after scaling
    pub width: u32,
    pub height: u32,
    pub color: PageColor,
    pub encoding: PageEncoding,
    pub bytes: Vec<u8>,
}

/// Page re-encoding capability (allows synthetic encoders in tests)
pub trait PageEncoder: Send + Sync {
    fn encode(&self, page: &PageRaster, params: &EncodeParams) -> DomainResult<EncodedPage>;
}

/// Settings handed to an external PDF compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalToolSettings {
    /// Image downsample resolution
    pub dpi: u32,
    /// JPEG quality for re-encoded images
    pub quality: u8,
    pub preset: PdfPreset,
    pub grayscale: bool,
}

/// Host-installed raster-based PDF compressor
pub trait ExternalCompressor: Send + Sync {
    /// Whether the version check found a working binary
    fn is_available(&self) -> bool;

    /// Version reported by `--version`
    fn version(&self) -> Option<&str>;

    /// Compress `input` into `output` in one blocking invocation.
    fn compress_file(&self, input: &Path, output: &Path, settings: &ExternalToolSettings) -> DomainResult<()>;

    fn name(&self) -> &'static str;
}
