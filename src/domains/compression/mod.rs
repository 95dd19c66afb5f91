// Declare submodules for the compression domain
pub mod types;
pub mod workspace;
pub mod rasterizer;
pub mod compressors;
pub mod assembler;
pub mod search;
pub mod inflation;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use types::{
    CompressionInput, CompressionMethod, CompressionOptions, CompressionRequest,
    CompressionResult, EngineConfig, PageEncoding, Subsampling, TargetBand,
};

pub use assembler::{DocumentAssembler, PdfAssembler};
pub use compressors::{ExternalCompressor, PageEncoder};
pub use rasterizer::{DocumentRasterizer, PageRaster, PageRasterizer};
pub use search::{CandidateEncoding, QualitySearch};
pub use inflation::InflationCorrector;
pub use service::{CompressionEngine, CompressionService, CompressionServiceImpl};
