//! Size-targeted document compression.
//!
//! Shrinks scanned PDFs and photos into a caller-supplied size band
//! (`min_kb ..= max_kb`, aiming at `target_kb`). See
//! [`domains::compression::CompressionEngine`] for the pipeline and
//! [`ffi`] for the C boundary used by host applications.

// Public modules
pub mod domains;
pub mod errors;
pub mod ffi;

pub use domains::compression::types::{
    CompressionOptions, CompressionRequest, CompressionResult, EngineConfig, TargetBand,
};
pub use domains::{CompressionEngine, CompressionService, CompressionServiceImpl};
