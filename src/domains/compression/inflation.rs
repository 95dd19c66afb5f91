//! Adds bytes back when the search lands below the band, by re-encoding a
//! single page losslessly.
//!
//! Pages are tried smallest area first so the substitution touches as little of
//! the document as possible. This is a heuristic; it does not guarantee the
//! closest possible size.

use crate::errors::DomainResult;
use super::assembler::DocumentAssembler;
use super::compressors::{EncodeParams, PageEncoder};
use super::rasterizer::PageRaster;
use super::search::CandidateEncoding;
use super::types::{to_kb, CompressionOptions, PageEncoding, TargetBand};

/// zlib effort levels, most compressed first
pub const LOSSLESS_LEVELS: [u8; 5] = [9, 6, 3, 1, 0];

#[derive(Debug, Clone)]
pub struct InflationOutcome {
    pub candidate: CandidateEncoding,
    /// `(page index, level)` of the substituted page, if any
    pub lossless_page: Option<(usize, u8)>,
    pub attempts: usize,
}

pub struct InflationCorrector<'a> {
    encoder: &'a dyn PageEncoder,
    assembler: &'a dyn DocumentAssembler,
    grayscale: bool,
    contrast_boost: f32,
}

impl<'a> InflationCorrector<'a> {
    pub fn new(encoder: &'a dyn PageEncoder, assembler: &'a dyn DocumentAssembler, options: &CompressionOptions) -> Self {
        Self {
            encoder,
            assembler,
            grayscale: options.grayscale,
            contrast_boost: options.contrast_boost,
        }
    }

    /// `pages` must be the rasters `best` was encoded from, in the same order.
    pub fn inflate(&self, pages: &[PageRaster], best: CandidateEncoding, band: &TargetBand) -> DomainResult<InflationOutcome> {
        if best.kb() >= band.min_kb {
            return Ok(InflationOutcome { candidate: best, lossless_page: None, attempts: 0 });
        }
        log::info!("Candidate at {:.1} KB is below the band minimum {:.1} KB, inflating", best.kb(), band.min_kb);

        let mut order: Vec<usize> = (0..pages.len().min(best.pages.len())).collect();
        order.sort_by_key(|&pos| pages[pos].area());

        let baseline_distance = best.distance_from_target(band);
        let mut closest: Option<(usize, u8, Vec<_>, usize, f64)> = None;
        let mut attempts = 0;

        for pos in order {
            let page = &pages[pos];
            for level in LOSSLESS_LEVELS {
                attempts += 1;
                let params = EncodeParams {
                    encoding: PageEncoding::Lossless { level },
                    scale: best.scale,
                    grayscale: self.grayscale,
                    contrast_boost: self.contrast_boost,
                };
                let encoded = match self.encoder.encode(page, &params) {
                    Ok(encoded) => encoded,
                    Err(e) if e.is_recoverable() => {
                        log::warn!("Lossless encode of page {} at level {} failed: {}", page.index, level, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let mut trial = best.pages.clone();
                trial[pos] = encoded;
                let byte_size = self.assembler.measure(&trial)?;
                let kb = to_kb(byte_size);
                let distance = band.distance_to_target(kb);
                log::debug!("Lossless page {} at level {}: {:.1} KB", page.index, level, kb);

                if band.contains(kb) {
                    log::info!("Inflated into band with page {} lossless at level {}", page.index, level);
                    return Ok(InflationOutcome {
                        candidate: CandidateEncoding { pages: trial, byte_size, ..best },
                        lossless_page: Some((page.index, level)),
                        attempts,
                    });
                }
                if closest.as_ref().map_or(true, |c| distance < c.4) {
                    closest = Some((page.index, level, trial, byte_size, distance));
                }
            }
        }

        match closest {
            Some((index, level, trial, byte_size, distance)) if distance < baseline_distance => {
                log::info!(
                    "No substitution reached the band, keeping page {} lossless at level {} ({:.1} KB)",
                    index, level, to_kb(byte_size)
                );
                Ok(InflationOutcome {
                    candidate: CandidateEncoding { pages: trial, byte_size, ..best },
                    lossless_page: Some((index, level)),
                    attempts,
                })
            }
            _ => {
                log::info!("No lossless substitution improved on {:.1} KB", best.kb());
                Ok(InflationOutcome { candidate: best, lossless_page: None, attempts })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::compression::search::QualitySearch;
    use crate::domains::compression::testing::{blank_page, SummingAssembler, SyntheticEncoder};
    use crate::domains::compression::types::Subsampling;

    fn candidate(encoder: &SyntheticEncoder, pages: &[PageRaster], quality: u8) -> CandidateEncoding {
        QualitySearch::new(encoder, &SummingAssembler, &CompressionOptions::default())
            .encode_all(pages, quality, Subsampling::HighFidelity, 1.0)
            .unwrap()
    }

    fn inflate(encoder: &SyntheticEncoder, pages: &[PageRaster], best: CandidateEncoding) -> InflationOutcome {
        InflationCorrector::new(encoder, &SummingAssembler, &CompressionOptions::default())
            .inflate(pages, best, &TargetBand::DEFAULT)
            .unwrap()
    }

    fn three_pages() -> Vec<PageRaster> {
        vec![blank_page(0, 100, 100), blank_page(1, 50, 50), blank_page(2, 80, 80)]
    }

    #[test]
    fn test_not_triggered_at_or_above_min() {
        let pages = three_pages();
        let encoder = SyntheticEncoder::new(&pages, 400.0, 720.0);
        let best = candidate(&encoder, &pages, 72);
        let calls = encoder.call_count();

        let outcome = inflate(&encoder, &pages, best.clone());
        assert_eq!(outcome.lossless_page, None);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.candidate.byte_size, best.byte_size);
        assert_eq!(encoder.call_count(), calls);
    }

    #[test]
    fn test_smallest_page_goes_lossless_first() {
        // 210 KB lossy; the 50x50 page at level 9 lifts the total to about 277 KB
        let pages = three_pages();
        let encoder = SyntheticEncoder::new(&pages, 300.0, 720.0);
        let best = candidate(&encoder, &pages, 70);
        assert!(best.kb() < TargetBand::DEFAULT.min_kb);

        let outcome = inflate(&encoder, &pages, best);
        assert_eq!(outcome.lossless_page, Some((1, 9)));
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.candidate.in_band(&TargetBand::DEFAULT));
        assert_eq!(outcome.candidate.lossless_page_count(), 1);
        assert!(outcome.candidate.pages[1].encoding.is_lossless());
        assert_eq!(outcome.candidate.quality, 70);
    }

    #[test]
    fn test_keeps_closest_substitution_when_band_unreachable() {
        // 200 KB lossy, lossless grows from 180 KB (level 9) to 261 KB (level 0)
        let pages = vec![blank_page(0, 40, 40)];
        let encoder = SyntheticEncoder::new(&pages, 200.0, 180.0);
        let best = candidate(&encoder, &pages, 100);

        let outcome = inflate(&encoder, &pages, best);
        assert_eq!(outcome.lossless_page, Some((0, 0)));
        assert_eq!(outcome.attempts, LOSSLESS_LEVELS.len());
        assert!(!outcome.candidate.in_band(&TargetBand::DEFAULT));
        assert!((outcome.candidate.kb() - 261.0).abs() < 0.5);
    }

    #[test]
    fn test_no_substitution_when_nothing_improves() {
        // lossless pages are smaller than the lossy ones, every trial moves away from target
        let pages = three_pages();
        let encoder = SyntheticEncoder::new(&pages, 300.0, 50.0);
        let best = candidate(&encoder, &pages, 70);

        let outcome = inflate(&encoder, &pages, best.clone());
        assert_eq!(outcome.lossless_page, None);
        assert_eq!(outcome.attempts, 3 * LOSSLESS_LEVELS.len());
        assert_eq!(outcome.candidate.byte_size, best.byte_size);
        assert_eq!(outcome.candidate.lossless_page_count(), 0);
    }

    #[test]
    fn test_never_more_than_one_lossless_page() {
        let pages = three_pages();
        for lossless_kb in [100.0, 400.0, 720.0, 2000.0, 10000.0] {
            let encoder = SyntheticEncoder::new(&pages, 300.0, lossless_kb);
            let best = candidate(&encoder, &pages, 70);
            let outcome = inflate(&encoder, &pages, best);
            assert!(outcome.candidate.lossless_page_count() <= 1, "lossless_kb {lossless_kb}");
        }
    }
}
