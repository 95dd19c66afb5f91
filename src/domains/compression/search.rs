//! Band-seeking search over lossy quality, with downscale and chroma
//! subsampling as escalation levers when quality alone cannot get under the band.

use crate::errors::{DomainError, DomainResult};
use super::assembler::DocumentAssembler;
use super::compressors::{EncodeParams, EncodedPage, PageEncoder};
use super::rasterizer::PageRaster;
use super::types::{to_kb, CompressionOptions, PageEncoding, Subsampling, TargetBand};

pub const INITIAL_QUALITY: u8 = 90;
pub const MIN_QUALITY: u8 = 70;
pub const MAX_QUALITY: u8 = 100;
/// Upper bound on measured candidates in the quality phase
pub const MAX_ITERATIONS: usize = 8;
/// In-band candidates this close to target end the search
pub const TARGET_TOLERANCE_KB: f64 = 2.0;
pub const SCALE_STEP: f32 = 0.03;
pub const SCALE_FLOOR: f32 = 0.92;

/// One fully encoded and measured version of the document
#[derive(Debug, Clone)]
pub struct CandidateEncoding {
    pub quality: u8,
    pub subsampling: Subsampling,
    pub scale: f32,
    /// Same order as the rasters they came from
    pub pages: Vec<EncodedPage>,
    /// Assembled document size
    pub byte_size: usize,
}

impl CandidateEncoding {
    pub fn kb(&self) -> f64 {
        to_kb(self.byte_size)
    }

    pub fn distance_from_target(&self, band: &TargetBand) -> f64 {
        band.distance_to_target(self.kb())
    }

    pub fn in_band(&self, band: &TargetBand) -> bool {
        band.contains(self.kb())
    }

    pub fn lossless_page_count(&self) -> usize {
        self.pages.iter().filter(|p| p.encoding.is_lossless()).count()
    }
}

/// An in-band candidate beats an out-of-band one; otherwise the closer to target wins.
pub fn is_better(candidate: &CandidateEncoding, current: &CandidateEncoding, band: &TargetBand) -> bool {
    match (candidate.in_band(band), current.in_band(band)) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.distance_from_target(band) < current.distance_from_target(band),
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: CandidateEncoding,
    /// Candidates measured during the quality phase
    pub iterations: usize,
    pub downscaled: bool,
    pub aggressive_subsampling: bool,
}

pub struct QualitySearch<'a> {
    encoder: &'a dyn PageEncoder,
    assembler: &'a dyn DocumentAssembler,
    grayscale: bool,
    contrast_boost: f32,
}

impl<'a> QualitySearch<'a> {
    pub fn new(encoder: &'a dyn PageEncoder, assembler: &'a dyn DocumentAssembler, options: &CompressionOptions) -> Self {
        Self {
            encoder,
            assembler,
            grayscale: options.grayscale,
            contrast_boost: options.contrast_boost,
        }
    }

    /// Encode every page with the same lossy parameters and measure the assembled result.
    pub fn encode_all(
        &self,
        pages: &[PageRaster],
        quality: u8,
        subsampling: Subsampling,
        scale: f32,
    ) -> DomainResult<CandidateEncoding> {
        let params = EncodeParams {
            encoding: PageEncoding::Lossy { quality, subsampling },
            scale,
            grayscale: self.grayscale,
            contrast_boost: self.contrast_boost,
        };
        let encoded = pages
            .iter()
            .map(|page| self.encoder.encode(page, &params))
            .collect::<DomainResult<Vec<_>>>()?;
        let byte_size = self.assembler.measure(&encoded)?;

        Ok(CandidateEncoding {
            quality,
            subsampling,
            scale,
            pages: encoded,
            byte_size,
        })
    }

    pub fn run(&self, pages: &[PageRaster], band: &TargetBand) -> DomainResult<SearchOutcome> {
        let (best, iterations) = self.search_quality(pages, band)?;
        let mut outcome = SearchOutcome {
            best,
            iterations,
            downscaled: false,
            aggressive_subsampling: false,
        };
        if outcome.best.kb() > band.max_kb {
            self.escalate(pages, band, &mut outcome)?;
        }
        Ok(outcome)
    }

    /// Binary search over `[MIN_QUALITY, MAX_QUALITY]` starting at `INITIAL_QUALITY`.
    ///
    /// Loop invariant: `low <= quality <= high`. Every measurement strictly shrinks
    /// the window, and the loop also stops after `MAX_ITERATIONS` measurements.
    fn search_quality(&self, pages: &[PageRaster], band: &TargetBand) -> DomainResult<(CandidateEncoding, usize)> {
        let mut low = MIN_QUALITY as i32;
        let mut high = MAX_QUALITY as i32;
        let mut quality = INITIAL_QUALITY as i32;
        let mut best: Option<CandidateEncoding> = None;
        let mut iterations = 0;

        while iterations < MAX_ITERATIONS && low <= high {
            iterations += 1;
            match self.encode_all(pages, quality as u8, Subsampling::HighFidelity, 1.0) {
                Ok(candidate) => {
                    let kb = candidate.kb();
                    let in_band = band.contains(kb);
                    log::debug!(
                        "Search iteration {}: quality {} -> {:.1} KB (window {}..={}, in band: {})",
                        iterations, quality, kb, low, high, in_band
                    );

                    // the first measurement only needs to land in band, later ones must approach target
                    let done = in_band && (iterations == 1 || band.distance_to_target(kb) <= TARGET_TOLERANCE_KB);

                    if kb > band.target_kb {
                        high = quality - 1;
                    } else {
                        low = quality + 1;
                    }
                    if best.as_ref().map_or(true, |current| is_better(&candidate, current, band)) {
                        best = Some(candidate);
                    }
                    if done {
                        break;
                    }
                }
                Err(e) if e.is_recoverable() => {
                    log::warn!("Encoding at quality {} failed, lowering the upper bound: {}", quality, e);
                    high = quality - 1;
                }
                Err(e) => return Err(e),
            }
            quality = low + (high - low) / 2;
        }

        let best = best.ok_or_else(|| {
            DomainError::Encoding(format!("No quality between {} and {} produced a candidate", MIN_QUALITY, MAX_QUALITY))
        })?;
        log::info!(
            "Quality search settled on quality {} at {:.1} KB after {} iteration(s)",
            best.quality, best.kb(), iterations
        );
        Ok((best, iterations))
    }

    /// Shrink scale towards `SCALE_FLOOR`, then fall back to aggressive subsampling
    /// for colour output.
    fn escalate(&self, pages: &[PageRaster], band: &TargetBand, outcome: &mut SearchOutcome) -> DomainResult<()> {
        let quality = outcome.best.quality;
        let mut scale = 1.0_f32;

        while outcome.best.kb() > band.max_kb && scale > SCALE_FLOOR + f32::EPSILON {
            scale = (scale - SCALE_STEP).max(SCALE_FLOOR);
            match self.encode_all(pages, quality, Subsampling::HighFidelity, scale) {
                Ok(candidate) => {
                    log::info!("Downscaled to {:.2}: {:.1} KB", scale, candidate.kb());
                    if candidate.byte_size <= outcome.best.byte_size {
                        outcome.best = candidate;
                        outcome.downscaled = true;
                    }
                }
                Err(e) if e.is_recoverable() => log::warn!("Encoding at scale {:.2} failed: {}", scale, e),
                Err(e) => return Err(e),
            }
        }

        // 4:2:0 has no chroma to drop in a Luma encode
        if outcome.best.kb() > band.max_kb && !self.grayscale {
            let scale = outcome.best.scale;
            match self.encode_all(pages, quality, Subsampling::Aggressive, scale) {
                Ok(candidate) => {
                    log::info!(
                        "Aggressive subsampling at quality {}, scale {:.2}: {:.1} KB",
                        quality, scale, candidate.kb()
                    );
                    if candidate.byte_size <= outcome.best.byte_size {
                        outcome.best = candidate;
                        outcome.aggressive_subsampling = true;
                    }
                }
                Err(e) if e.is_recoverable() => log::warn!("Aggressive subsampling encode failed: {}", e),
                Err(e) => return Err(e),
            }
        }

        if outcome.best.kb() > band.max_kb {
            log::warn!(
                "Best achievable size {:.1} KB is still above the band maximum {:.1} KB",
                outcome.best.kb(), band.max_kb
            );
        }
        Ok(())
    }
}
