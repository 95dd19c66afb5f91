//! Page encoder built on the `image`, `jpeg-encoder` and `flate2` crates

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::imageops::FilterType;
use image::DynamicImage;
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use std::io::Write;

use crate::errors::{DomainError, DomainResult};
use super::{EncodeParams, EncodedPage, PageColor, PageEncoder};
use crate::domains::compression::rasterizer::PageRaster;
use crate::domains::compression::types::{PageEncoding, Subsampling};

/// Re-encodes page rasters as JPEG (lossy) or zlib-compressed samples (lossless)
#[derive(Debug, Clone, Default)]
pub struct ImageCompressor;

impl PageEncoder for ImageCompressor {
    fn encode(&self, page: &PageRaster, params: &EncodeParams) -> DomainResult<EncodedPage> {
        let prepared = prepare_pixels(page, params);
        let (width, height) = (prepared.width, prepared.height);

        let bytes = match params.encoding {
            PageEncoding::Lossy { quality, subsampling } => encode_lossy(&prepared, quality, subsampling)?,
            PageEncoding::Lossless { level } => encode_lossless(&prepared.samples, level)?,
        };

        Ok(EncodedPage {
            index: page.index,
            width,
            height,
            color: prepared.color,
            encoding: params.encoding,
            bytes,
        })
    }
}

/// Raw samples ready for an encoder
struct PreparedPixels {
    width: u32,
    height: u32,
    color: PageColor,
    samples: Vec<u8>,
}

/// Resize, then convert to grayscale and apply the legibility boost.
fn prepare_pixels(page: &PageRaster, params: &EncodeParams) -> PreparedPixels {
    let (width, height) = page.scaled_dimensions(params.scale);
    let resized;
    let source: &DynamicImage = if (width, height) == (page.width, page.height) {
        &page.pixels
    } else {
        resized = page.pixels.resize_exact(width, height, FilterType::Lanczos3);
        &resized
    };

    let (color, mut samples) = if params.grayscale {
        (PageColor::Gray, source.to_luma8().into_raw())
    } else {
        (PageColor::Rgb, source.to_rgb8().into_raw())
    };

    if params.contrast_boost > 0.0 {
        let lut = contrast_lut(params.contrast_boost);
        for sample in samples.iter_mut() {
            *sample = lut[*sample as usize];
        }
    }

    PreparedPixels { width, height, color, samples }
}

/// Linear stretch around mid-grey by `1 + boost`, then gamma `1 + boost` to darken mid-tones.
pub fn contrast_lut(boost: f32) -> [u8; 256] {
    let gain = 1.0 + boost;
    let gamma = 1.0 + boost;
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let x = value as f32 / 255.0;
        let stretched = ((x - 0.5) * gain + 0.5).clamp(0.0, 1.0);
        *slot = (stretched.powf(gamma) * 255.0).round() as u8;
    }
    lut
}

fn encode_lossy(pixels: &PreparedPixels, quality: u8, subsampling: Subsampling) -> DomainResult<Vec<u8>> {
    let width = u16::try_from(pixels.width)
        .map_err(|_| DomainError::Encoding(format!("Width {} exceeds JPEG limits", pixels.width)))?;
    let height = u16::try_from(pixels.height)
        .map_err(|_| DomainError::Encoding(format!("Height {} exceeds JPEG limits", pixels.height)))?;

    let mut output = Vec::new();
    let mut encoder = Encoder::new(&mut output, quality.clamp(1, 100));
    let color_type = match pixels.color {
        PageColor::Rgb => {
            encoder.set_sampling_factor(match subsampling {
                Subsampling::HighFidelity => SamplingFactor::R_4_4_4,
                Subsampling::Aggressive => SamplingFactor::R_4_2_0,
            });
            ColorType::Rgb
        }
        PageColor::Gray => ColorType::Luma,
    };
    encoder.encode(&pixels.samples, width, height, color_type)?;
    Ok(output)
}

fn encode_lossless(samples: &[u8], level: u8) -> DomainResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9) as u32));
    encoder.write_all(samples)
        .map_err(|e| DomainError::Encoding(format!("Compression write error: {}", e)))?;
    encoder.finish()
        .map_err(|e| DomainError::Encoding(format!("Compression finish error: {}", e)))
}
