//! Type definitions for the compression domain.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{DomainError, DomainResult, ValidationError};

/// Bytes per kilobyte; every band threshold is compared in `bytes / 1024`.
pub const BYTES_PER_KB: f64 = 1024.0;

/// Largest accepted legibility boost.
pub const MAX_CONTRAST_BOOST: f32 = 0.2;

/// Convert a byte count into KB for band comparisons.
pub fn to_kb(bytes: usize) -> f64 {
    bytes as f64 / BYTES_PER_KB
}

/// Output size window `{min, max, target}` in KB
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetBand {
    pub min_kb: f64,
    pub max_kb: f64,
    pub target_kb: f64,
}

impl TargetBand {
    /// Default working band used when a caller does not supply one.
    pub const DEFAULT: TargetBand = TargetBand {
        min_kb: 275.0,
        max_kb: 295.0,
        target_kb: 290.0,
    };

    pub fn new(min_kb: f64, max_kb: f64, target_kb: f64) -> DomainResult<Self> {
        let band = Self { min_kb, max_kb, target_kb };
        band.validate()?;
        Ok(band)
    }

    /// Enforces `0 < min <= target <= max`.
    pub fn validate(&self) -> DomainResult<()> {
        let finite = self.min_kb.is_finite() && self.max_kb.is_finite() && self.target_kb.is_finite();
        if !finite || self.min_kb <= 0.0 {
            return Err(ValidationError::invalid_value("band", "bounds must be positive numbers").into());
        }
        if self.min_kb > self.target_kb || self.target_kb > self.max_kb {
            return Err(ValidationError::range("band.target_kb", self.min_kb, self.max_kb).into());
        }
        Ok(())
    }

    pub fn contains(&self, kb: f64) -> bool {
        kb >= self.min_kb && kb <= self.max_kb
    }

    pub fn distance_to_target(&self, kb: f64) -> f64 {
        (kb - self.target_kb).abs()
    }
}

impl Default for TargetBand {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Per-request encoding options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    pub grayscale: bool,
    /// 0.0 ..= 0.2, 0 disables the boost
    pub contrast_boost: f32,
    /// Try the external tool even outside its size-eligibility window
    pub force_external_tool: bool,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            grayscale: false,
            contrast_boost: 0.0,
            force_external_tool: false,
        }
    }
}

impl CompressionOptions {
    pub fn validate(&self) -> DomainResult<()> {
        if !(0.0..=MAX_CONTRAST_BOOST).contains(&self.contrast_boost) {
            return Err(ValidationError::range("contrast_boost", 0.0, MAX_CONTRAST_BOOST).into());
        }
        Ok(())
    }
}

/// Where the document to compress comes from
#[derive(Debug, Clone)]
pub enum CompressionInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// One call to the engine
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    pub input: CompressionInput,
    /// Destination file; when absent the bytes are returned in the result
    pub output_path: Option<PathBuf>,
    pub band: TargetBand,
    pub options: CompressionOptions,
}

impl CompressionRequest {
    pub fn from_bytes(data: Vec<u8>, band: TargetBand) -> Self {
        Self {
            input: CompressionInput::Bytes(data),
            output_path: None,
            band,
            options: CompressionOptions::default(),
        }
    }

    pub fn from_path(input: impl Into<PathBuf>, output: impl Into<PathBuf>, band: TargetBand) -> Self {
        Self {
            input: CompressionInput::Path(input.into()),
            output_path: Some(output.into()),
            band,
            options: CompressionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompressionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.band.validate()?;
        self.options.validate()
    }
}

/// Chroma subsampling applied by the lossy encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsampling {
    /// 4:4:4, full chroma resolution
    HighFidelity,
    /// 4:2:0
    Aggressive,
}

impl Subsampling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subsampling::HighFidelity => "4:4:4",
            Subsampling::Aggressive => "4:2:0",
        }
    }
}

/// How a single page is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageEncoding {
    Lossy { quality: u8, subsampling: Subsampling },
    /// zlib effort 0-9
    Lossless { level: u8 },
}

impl PageEncoding {
    pub fn is_lossless(&self) -> bool {
        matches!(self, PageEncoding::Lossless { .. })
    }
}

/// Ghostscript `-dPDFSETTINGS` preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfPreset {
    Screen,
    Ebook,
}

impl PdfPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfPreset::Screen => "screen",
            PdfPreset::Ebook => "ebook",
        }
    }
}

/// Strategy that produced the final bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Input already under target, copied verbatim
    None,
    ExternalTool { preset: PdfPreset, grayscale: bool },
    RasterSearch { grayscale: bool },
}

impl CompressionMethod {
    pub fn label(&self) -> String {
        match self {
            CompressionMethod::None => "none".to_string(),
            CompressionMethod::ExternalTool { preset, grayscale } => {
                let mut label = format!("external-tool:{}", preset.as_str());
                if *grayscale {
                    label.push_str(":gray");
                }
                label
            }
            CompressionMethod::RasterSearch { grayscale } => {
                if *grayscale {
                    "raster-search:gray".to_string()
                } else {
                    "raster-search".to_string()
                }
            }
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<CompressionMethod> for String {
    fn from(method: CompressionMethod) -> Self {
        method.label()
    }
}

/// Result descriptor returned to the rest of the application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Percentage of bytes saved
    pub compression_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsampling: Option<Subsampling>,
    pub duration_ms: i64,
    /// Output bytes when the request had no output path
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

impl CompressionResult {
    pub fn succeeded(method: CompressionMethod, original_size: u64, compressed_size: u64) -> Self {
        Self {
            success: true,
            method: Some(method.label()),
            original_size,
            compressed_size,
            compression_ratio: compression_ratio(original_size, compressed_size),
            ..Default::default()
        }
    }

    pub fn failed(original_size: u64, error: &DomainError) -> Self {
        Self {
            success: false,
            original_size,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn compressed_kb(&self) -> f64 {
        self.compressed_size as f64 / BYTES_PER_KB
    }
}

/// Percentage saved, 0 when the original is empty.
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    (1.0 - compressed_size as f64 / original_size as f64) * 100.0
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parent of every request-scoped workspace
    pub temp_root: PathBuf,
    pub ghostscript_path: String,
    pub pdfium_library_path: Option<String>,
    /// Working resolution of the page rasterizer
    pub raster_dpi: u32,
    pub external_tool_min_kb: f64,
    pub external_tool_max_kb: f64,
    pub max_in_memory_bytes: u64,
    /// Band used by callers that do not supply one
    pub default_band: TargetBand,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temp_root: env::temp_dir().join("docband"),
            ghostscript_path: "gs".to_string(),
            pdfium_library_path: None,
            raster_dpi: 150,
            external_tool_min_kb: 300.0,
            external_tool_max_kb: 1024.0 * 1024.0,
            max_in_memory_bytes: 2048 * 1024 * 1024, // 2GB
            default_band: TargetBand::DEFAULT,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `DOCBAND_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = env::var("DOCBAND_TEMP_ROOT") {
            config.temp_root = PathBuf::from(root);
        }
        if let Ok(gs) = env::var("DOCBAND_GHOSTSCRIPT_PATH") {
            config.ghostscript_path = gs;
        }
        if let Ok(path) = env::var("PDFIUM_DYNAMIC_LIB_PATH") {
            config.pdfium_library_path = Some(path);
        }
        if let Some(dpi) = parse_env::<u32>("DOCBAND_RASTER_DPI") {
            config.raster_dpi = dpi;
        }
        if let Some(kb) = parse_env::<f64>("DOCBAND_EXTERNAL_TOOL_MIN_KB") {
            config.external_tool_min_kb = kb;
        }
        if let Some(kb) = parse_env::<f64>("DOCBAND_EXTERNAL_TOOL_MAX_KB") {
            config.external_tool_max_kb = kb;
        }
        if let Some(bytes) = parse_env::<u64>("MAX_IN_MEMORY_COMPRESSION_BYTES") {
            config.max_in_memory_bytes = bytes;
        }
        config
    }

    /// Whether an input of `kb` falls inside the external tool's useful range.
    pub fn external_tool_eligible(&self, kb: f64) -> bool {
        kb >= self.external_tool_min_kb && kb <= self.external_tool_max_kb
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring unparsable {}={}", key, raw);
            None
        }
    }
}
