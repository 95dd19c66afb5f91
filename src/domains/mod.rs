pub mod compression;

pub use compression::{CompressionEngine, CompressionService, CompressionServiceImpl};
