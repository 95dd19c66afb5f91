use async_trait::async_trait;
use futures::future::join_all;
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tokio::task;
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult, ServiceError, ServiceResult};
use super::assembler::{DocumentAssembler, PdfAssembler};
use super::compressors::{
    image_compressor::ImageCompressor,
    pdf_compressor::{try_external_tool, PdfCompressor},
    ExternalCompressor,
    PageEncoder,
};
use super::inflation::InflationCorrector;
use super::rasterizer::{detect_input_kind, DocumentRasterizer, InputKind, PageRasterizer};
use super::search::QualitySearch;
use super::types::{
    to_kb, CompressionInput, CompressionMethod, CompressionRequest, CompressionResult, EngineConfig,
};
use super::workspace::Workspace;

/// Synchronous compression engine.
///
/// Holds configuration and collaborators only; every call owns its own
/// workspace, so one engine can serve concurrent requests.
pub struct CompressionEngine {
    config: EngineConfig,
    rasterizer: Arc<dyn PageRasterizer>,
    encoder: Arc<dyn PageEncoder>,
    assembler: Arc<dyn DocumentAssembler>,
    external_tool: Arc<dyn ExternalCompressor>,
}

impl CompressionEngine {
    /// Engine with the production collaborators. Looks up Ghostscript once.
    pub fn new(config: EngineConfig) -> Self {
        let rasterizer = Arc::new(DocumentRasterizer::new(config.pdfium_library_path.clone()));
        let external_tool = Arc::new(PdfCompressor::detect(Some(config.ghostscript_path.clone())));
        Self::with_components(config, rasterizer, Arc::new(ImageCompressor), Arc::new(PdfAssembler), external_tool)
    }

    pub fn with_components(
        config: EngineConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        encoder: Arc<dyn PageEncoder>,
        assembler: Arc<dyn DocumentAssembler>,
        external_tool: Arc<dyn ExternalCompressor>,
    ) -> Self {
        Self { config, rasterizer, encoder, assembler, external_tool }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn external_tool(&self) -> &dyn ExternalCompressor {
        self.external_tool.as_ref()
    }

    /// Compress one document. Never fails: errors come back as `success = false`.
    pub fn compress(&self, request: &CompressionRequest) -> CompressionResult {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let mut original_size = 0u64;

        let outcome = self.run(request, request_id, &mut original_size);

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => {
                log::error!("[{}] Compression failed: {}", request_id, e);
                CompressionResult::failed(original_size, &e)
            }
        };
        result.duration_ms = started.elapsed().as_millis() as i64;
        log::info!(
            "[{}] Finished in {} ms: success={}, method={}, {} -> {} bytes",
            request_id,
            result.duration_ms,
            result.success,
            result.method.as_deref().unwrap_or("-"),
            result.original_size,
            result.compressed_size
        );
        result
    }

    fn run(&self, request: &CompressionRequest, request_id: Uuid, original_size: &mut u64) -> DomainResult<CompressionResult> {
        request.validate()?;

        let input = self.load_input(&request.input)?;
        *original_size = input.len() as u64;
        let band = request.band;
        let original_kb = to_kb(input.len());
        log::info!(
            "[{}] Compressing {:.1} KB into [{:.1}, {:.1}] KB, target {:.1} KB",
            request_id, original_kb, band.min_kb, band.max_kb, band.target_kb
        );

        if original_kb <= band.target_kb {
            log::info!("[{}] Input already at or below target, copying verbatim", request_id);
            let mut result = CompressionResult::succeeded(CompressionMethod::None, *original_size, *original_size);
            deliver(request.output_path.as_deref(), input.into_owned(), &mut result)?;
            return Ok(result);
        }

        // the verbatim copy above never touches temp_root
        let workspace = Workspace::create(&self.config.temp_root, request_id)?;
        let result = self.compress_staged(request, input, &workspace, *original_size);
        workspace.close();
        result
    }

    /// External tool, then the raster pipeline, for inputs above target.
    fn compress_staged(
        &self,
        request: &CompressionRequest,
        input: Cow<'_, [u8]>,
        workspace: &Workspace,
        original_size: u64,
    ) -> DomainResult<CompressionResult> {
        let request_id = workspace.request_id();
        let band = request.band;
        let options = request.options;
        let original_kb = to_kb(input.len());

        if self.external_tool_applies(&input, original_kb, request) {
            match try_external_tool(self.external_tool.as_ref(), workspace, &input, band.target_kb, options.grayscale) {
                Ok(outcome) if band.contains(outcome.kb()) => {
                    let method = CompressionMethod::ExternalTool {
                        preset: outcome.settings.preset,
                        grayscale: options.grayscale,
                    };
                    let mut result = CompressionResult::succeeded(method, original_size, outcome.bytes.len() as u64);
                    deliver(request.output_path.as_deref(), outcome.bytes, &mut result)?;
                    return Ok(result);
                }
                Ok(outcome) => log::info!(
                    "[{}] External tool output {:.1} KB is outside the band, using the raster pipeline",
                    request_id,
                    outcome.kb()
                ),
                Err(e) => log::warn!("[{}] External tool failed, using the raster pipeline: {}", request_id, e),
            }
        }

        let pages = self.rasterizer.rasterize(&input, self.config.raster_dpi)?;
        drop(input);

        let search = QualitySearch::new(self.encoder.as_ref(), self.assembler.as_ref(), &options);
        let outcome = search.run(&pages, &band)?;
        let inflation = InflationCorrector::new(self.encoder.as_ref(), self.assembler.as_ref(), &options)
            .inflate(&pages, outcome.best, &band)?;
        let candidate = inflation.candidate;

        let bytes = self.assembler.assemble(&candidate.pages)?;
        let kb = to_kb(bytes.len());
        if !band.contains(kb) {
            log::warn!("[{}] Returning best effort {:.1} KB outside the band", request_id, kb);
        }

        let method = CompressionMethod::RasterSearch { grayscale: options.grayscale };
        let mut result = CompressionResult::succeeded(method, original_size, bytes.len() as u64);
        result.page_count = Some(pages.len());
        result.quality = Some(candidate.quality);
        result.scale = Some(candidate.scale);
        result.subsampling = Some(candidate.subsampling);
        deliver(request.output_path.as_deref(), bytes, &mut result)?;
        Ok(result)
    }

    fn load_input<'r>(&self, input: &'r CompressionInput) -> DomainResult<Cow<'r, [u8]>> {
        let limit = self.config.max_in_memory_bytes;
        match input {
            CompressionInput::Bytes(data) => {
                if data.len() as u64 > limit {
                    return Err(DomainError::Io(format!("Input of {} bytes exceeds the in-memory limit of {} bytes", data.len(), limit)));
                }
                Ok(Cow::Borrowed(data.as_slice()))
            }
            CompressionInput::Path(path) => {
                let metadata = fs::metadata(path)
                    .map_err(|e| DomainError::Io(format!("Cannot read {}: {}", path.display(), e)))?;
                if metadata.len() > limit {
                    return Err(DomainError::Io(format!(
                        "{} is {} bytes, above the in-memory limit of {} bytes",
                        path.display(), metadata.len(), limit
                    )));
                }
                let data = fs::read(path)
                    .map_err(|e| DomainError::Io(format!("Cannot read {}: {}", path.display(), e)))?;
                Ok(Cow::Owned(data))
            }
        }
    }

    /// PDF input, tool installed, and size inside the useful window (unless forced).
    fn external_tool_applies(&self, input: &[u8], original_kb: f64, request: &CompressionRequest) -> bool {
        if !self.external_tool.is_available() {
            return false;
        }
        if !matches!(detect_input_kind(input), Ok(InputKind::Pdf)) {
            return false;
        }
        let eligible = request.options.force_external_tool || self.config.external_tool_eligible(original_kb);
        if !eligible {
            log::debug!("{:.1} KB is outside the external tool window, skipping it", original_kb);
        }
        eligible
    }
}

/// Write to the output path, or hand the bytes back in the result.
fn deliver(output_path: Option<&Path>, bytes: Vec<u8>, result: &mut CompressionResult) -> DomainResult<()> {
    match output_path {
        Some(path) => write_atomically(path, &bytes),
        None => {
            result.data = Some(bytes);
            Ok(())
        }
    }
}

/// Stage next to the destination and rename into place.
fn write_atomically(path: &Path, data: &[u8]) -> DomainResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(data)?;
    staged.flush()?;
    staged
        .persist(path)
        .map_err(|e| DomainError::Io(format!("Failed to persist {}: {}", path.display(), e.error)))?;
    Ok(())
}

#[async_trait]
pub trait CompressionService: Send + Sync {
    /// Compress one document on the blocking pool
    async fn compress(&self, request: CompressionRequest) -> ServiceResult<CompressionResult>;

    /// Compress independent documents concurrently, results in request order
    async fn compress_many(&self, requests: Vec<CompressionRequest>) -> Vec<ServiceResult<CompressionResult>>;

    /// Version of the external compressor, if one was found
    fn external_tool_version(&self) -> Option<String>;
}

pub struct CompressionServiceImpl {
    engine: Arc<CompressionEngine>,
}

impl CompressionServiceImpl {
    pub fn new(engine: CompressionEngine) -> Self {
        Self { engine: Arc::new(engine) }
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self::new(CompressionEngine::new(config))
    }

    pub fn engine(&self) -> &CompressionEngine {
        &self.engine
    }
}

#[async_trait]
impl CompressionService for CompressionServiceImpl {
    async fn compress(&self, request: CompressionRequest) -> ServiceResult<CompressionResult> {
        let engine = Arc::clone(&self.engine);
        task::spawn_blocking(move || engine.compress(&request))
            .await
            .map_err(|e| ServiceError::TaskJoin(e.to_string()))
    }

    async fn compress_many(&self, requests: Vec<CompressionRequest>) -> Vec<ServiceResult<CompressionResult>> {
        log::info!("Compressing batch of {} document(s)", requests.len());
        join_all(requests.into_iter().map(|request| self.compress(request))).await
    }

    fn external_tool_version(&self) -> Option<String> {
        self.engine.external_tool().version().map(str::to_string)
    }
}
