//! PDF compression through Ghostscript

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::errors::{DomainError, DomainResult};
use super::{ExternalCompressor, ExternalToolSettings};
use crate::domains::compression::types::{to_kb, PdfPreset, BYTES_PER_KB};
use crate::domains::compression::workspace::Workspace;

/// PDF compressor using external tools (gs)
#[derive(Debug, Clone)]
pub struct PdfCompressor {
    ghostscript_path: String,
    version: Option<String>,
}

impl PdfCompressor {
    /// Locate Ghostscript and query its version once. A missing binary only
    /// disables the compressor.
    pub fn detect(ghostscript_path: Option<String>) -> Self {
        let ghostscript_path = ghostscript_path.unwrap_or_else(|| "gs".to_string());
        let version = query_version(&ghostscript_path);
        match &version {
            Some(v) => log::info!("Ghostscript {} found at '{}'", v, ghostscript_path),
            None => log::info!("Ghostscript not available at '{}', external tool strategy disabled", ghostscript_path),
        }
        Self { ghostscript_path, version }
    }

    pub fn path(&self) -> &str {
        &self.ghostscript_path
    }
}

fn query_version(ghostscript_path: &str) -> Option<String> {
    let output = Command::new(ghostscript_path)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() { None } else { Some(version) }
}

impl ExternalCompressor for PdfCompressor {
    fn is_available(&self) -> bool {
        self.version.is_some()
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn compress_file(&self, input: &Path, output: &Path, settings: &ExternalToolSettings) -> DomainResult<()> {
        let args = ghostscript_args(input, output, settings);
        log::debug!("Running {} {}", self.ghostscript_path, args.join(" "));

        let result = Command::new(&self.ghostscript_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DomainError::ToolUnavailable(format!("Ghostscript binary '{}' not found", self.ghostscript_path)),
                _ => DomainError::Internal(format!("Failed to execute ghostscript: {}", e)),
            })?;

        if !result.status.success() {
            let error = String::from_utf8_lossy(&result.stderr);
            return Err(DomainError::Internal(format!("Ghostscript error ({}): {}", result.status, error.trim())));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ghostscript"
    }
}

/// Full `pdfwrite` argument list for one invocation.
pub fn ghostscript_args(input: &Path, output: &Path, settings: &ExternalToolSettings) -> Vec<String> {
    let mut args = vec![
        "-sDEVICE=pdfwrite".to_string(),
        "-dCompatibilityLevel=1.4".to_string(),
        format!("-dPDFSETTINGS=/{}", settings.preset.as_str()),
        "-dNOPAUSE".to_string(),
        "-dQUIET".to_string(),
        "-dBATCH".to_string(),
        "-dDownsampleColorImages=true".to_string(),
        "-dDownsampleGrayImages=true".to_string(),
        "-dDownsampleMonoImages=true".to_string(),
        format!("-dColorImageResolution={}", settings.dpi),
        format!("-dGrayImageResolution={}", settings.dpi),
        format!("-dMonoImageResolution={}", settings.dpi),
        "-dColorImageDownsampleType=/Bicubic".to_string(),
        "-dGrayImageDownsampleType=/Bicubic".to_string(),
        "-dAutoFilterColorImages=false".to_string(),
        "-dAutoFilterGrayImages=false".to_string(),
        "-dColorImageFilter=/DCTEncode".to_string(),
        "-dGrayImageFilter=/DCTEncode".to_string(),
        format!("-dJPEGQ={}", settings.quality),
    ];
    if settings.grayscale {
        args.push("-sColorConversionStrategy=Gray".to_string());
        args.push("-dProcessColorModel=/DeviceGray".to_string());
    }
    args.push(format!("-sOutputFile={}", output.to_string_lossy()));
    args.push(input.to_string_lossy().into_owned());
    args
}

/// Map the required size ratio (`target / original`) to downsample DPI, JPEG quality and preset.
pub fn settings_for_ratio(ratio: f64, grayscale: bool) -> ExternalToolSettings {
    let (dpi, quality, preset) = if ratio < 0.10 {
        (72, 45, PdfPreset::Screen)
    } else if ratio < 0.30 {
        (96, 50, PdfPreset::Screen)
    } else if ratio < 0.50 {
        (120, 60, PdfPreset::Ebook)
    } else {
        (150, 65, PdfPreset::Ebook)
    };
    ExternalToolSettings { dpi, quality, preset, grayscale }
}

/// What one external-tool run produced. The band check is left to the caller.
#[derive(Debug, Clone)]
pub struct ExternalToolOutcome {
    pub bytes: Vec<u8>,
    pub settings: ExternalToolSettings,
}

impl ExternalToolOutcome {
    pub fn kb(&self) -> f64 {
        to_kb(self.bytes.len())
    }
}

/// Run the external tool once on `input`, staging files in the request workspace.
pub fn try_external_tool(
    tool: &dyn ExternalCompressor,
    workspace: &Workspace,
    input: &[u8],
    target_kb: f64,
    grayscale: bool,
) -> DomainResult<ExternalToolOutcome> {
    if !tool.is_available() {
        return Err(DomainError::ToolUnavailable(format!("{} is not installed", tool.name())));
    }
    if input.is_empty() {
        return Err(DomainError::Extraction("Input document is empty".to_string()));
    }

    let ratio = target_kb * BYTES_PER_KB / input.len() as f64;
    let settings = settings_for_ratio(ratio, grayscale);
    log::info!(
        "Trying {} with ratio {:.3}: {} DPI, quality {}, /{}{}",
        tool.name(),
        ratio,
        settings.dpi,
        settings.quality,
        settings.preset.as_str(),
        if grayscale { ", grayscale" } else { "" }
    );

    let input_path = workspace.write_file("external-input.pdf", input)?;
    let output_path = workspace.file("external-output.pdf");
    tool.compress_file(&input_path, &output_path, &settings)?;

    let bytes = std::fs::read(&output_path)
        .map_err(|e| DomainError::Io(format!("Failed to read {} output: {}", tool.name(), e)))?;
    log::info!("{} produced {:.1} KB", tool.name(), to_kb(bytes.len()));
    Ok(ExternalToolOutcome { bytes, settings })
}
