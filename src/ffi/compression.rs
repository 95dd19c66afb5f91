// src/ffi/compression.rs
// =============================================================================
// COMPRESSION ENGINE – FFI BINDINGS
// =============================================================================
// Exposes the size-targeted compression engine to host applications.
// All functions follow standard FFI conventions: JSON payloads, explicit
// success/error codes, and manual memory management for returned strings.
//
// MEMORY OWNERSHIP:
// - The host owns input JSON strings (read-only in Rust)
// - Rust owns output strings (the host must call compression_free)
// - All strings are UTF-8, null-terminated
//
// JSON CONTRACTS:
// - compress: {"input_path": "...", "output_path": "...",
//              "band": {"min_kb", "max_kb", "target_kb"}?,
//              "options": {"grayscale", "contrast_boost", "force_external_tool"}?,
//              "config": EngineConfig?}
//   Output: CompressionResult JSON, or FFIError JSON for malformed payloads
//   The file at output_path is a PDF for "raster-search" and "external-tool:*"
//   results whatever its extension; only "none" copies the input's own format.
// - detect_external_tool: no input
//   Output: {"available": bool, "version": string?, "path": string}
//
// No state is kept between calls. Each call builds its own engine from the
// payload config (or the DOCBAND_* environment) and its own temp workspace.
// -----------------------------------------------------------------------------

use crate::ffi::{handle_json_result, to_ffi_error, FFIResult};
use crate::ffi::error::{FFIError, ErrorCode};
use crate::domains::compression::compressors::{pdf_compressor::PdfCompressor, ExternalCompressor};
use crate::domains::compression::service::{CompressionService, CompressionServiceImpl};
use crate::domains::compression::types::{
    CompressionOptions, CompressionRequest, CompressionResult, EngineConfig, TargetBand,
};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;

// -----------------------------------------------------------------------------
// DTO Types for JSON Deserialization -------------------------------------------
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct CompressPayload {
    input_path: String,
    output_path: String,
    band: Option<TargetBand>,
    #[serde(default)]
    options: CompressionOptions,
    config: Option<EngineConfig>,
}

#[derive(Serialize)]
struct ExternalToolStatus {
    available: bool,
    version: Option<String>,
    path: String,
}

// Helper to parse JSON input
fn parse_json_input<T: for<'de> Deserialize<'de>>(input: *const c_char) -> FFIResult<T> {
    if input.is_null() {
        return Err(FFIError::new(ErrorCode::NullPointer, "Input JSON is null"));
    }

    let c_str = unsafe { CStr::from_ptr(input) };
    let json_str = c_str.to_str()
        .map_err(|_| FFIError::new(ErrorCode::InvalidUtf8, "Invalid UTF-8 in input JSON"))?;

    serde_json::from_str(json_str)
        .map_err(|e| FFIError::with_details(
            ErrorCode::InvalidArgument,
            "JSON parsing failed",
            &format!("Failed to parse JSON: {}", e)
        ))
}

fn compress_payload(payload: CompressPayload) -> FFIResult<CompressionResult> {
    let config = payload.config.unwrap_or_else(EngineConfig::from_env);
    let band = payload.band.unwrap_or(config.default_band);
    let request = CompressionRequest::from_path(payload.input_path, payload.output_path, band)
        .with_options(payload.options);

    let service = CompressionServiceImpl::from_config(config);
    let rt = Runtime::new()
        .map_err(|e| FFIError::with_details(ErrorCode::InternalError, "Failed to create async runtime", &e.to_string()))?;

    rt.block_on(async {
        service.compress(request).await
            .map_err(|e| to_ffi_error(e))
    })
}

// -----------------------------------------------------------------------------
// FFI Functions ----------------------------------------------------------------
// -----------------------------------------------------------------------------

/// Compress a document into a size band
/// Input: {"input_path", "output_path", "band"?, "options"?, "config"?}
/// Output: CompressionResult JSON
/// Raster and external-tool results are written as PDF regardless of the
/// `output_path` extension; a `none` result is a verbatim copy of the input.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn compression_compress(payload_json: *const c_char, result: *mut *mut c_char) -> c_int {
    let _ = env_logger::try_init();
    let json_result = handle_json_result(|| -> FFIResult<_> {
        let payload: CompressPayload = parse_json_input(payload_json)?;
        compress_payload(payload)
    });

    if !result.is_null() {
        unsafe { *result = json_result; }
    }
    if json_result.is_null() { ErrorCode::InternalError as c_int } else { ErrorCode::Success as c_int }
}

/// Report whether the external PDF compressor is installed
/// Output: {"available": bool, "version": string?, "path": string}
#[unsafe(no_mangle)]
pub unsafe extern "C" fn compression_detect_external_tool(result: *mut *mut c_char) -> c_int {
    let _ = env_logger::try_init();
    let json_result = handle_json_result(|| -> FFIResult<_> {
        let config = EngineConfig::from_env();
        let tool = PdfCompressor::detect(Some(config.ghostscript_path));
        Ok(ExternalToolStatus {
            available: tool.is_available(),
            version: tool.version().map(str::to_string),
            path: tool.path().to_string(),
        })
    });

    if !result.is_null() {
        unsafe { *result = json_result; }
    }
    if json_result.is_null() { ErrorCode::InternalError as c_int } else { ErrorCode::Success as c_int }
}

// -----------------------------------------------------------------------------
// Memory management -----------------------------------------------------------
// -----------------------------------------------------------------------------

/// Free string memory allocated by Rust
/// SAFETY: Must be called exactly once for each string returned from compression FFI functions
#[unsafe(no_mangle)]
pub unsafe extern "C" fn compression_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe { let _ = CString::from_raw(ptr); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::compression::testing::{noisy_page, png_bytes};
    use std::ptr;

    unsafe fn take_json(ptr: *mut c_char) -> serde_json::Value {
        let json = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { compression_free(ptr) };
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_compress_small_image_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.png");
        let output = dir.path().join("photo-out.png");
        std::fs::write(&input, png_bytes(16, 16)).unwrap();

        let payload = serde_json::json!({
            "input_path": input,
            "output_path": output,
            "config": { "temp_root": dir.path().join("work"), "ghostscript_path": "/nonexistent/gs" },
        });
        let payload = CString::new(payload.to_string()).unwrap();
        let mut out: *mut c_char = ptr::null_mut();

        let code = unsafe { compression_compress(payload.as_ptr(), &mut out) };
        assert_eq!(code, ErrorCode::Success as c_int);
        let json = unsafe { take_json(out) };
        assert_eq!(json["success"], true);
        assert_eq!(json["method"], "none");
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&input).unwrap());
    }

    #[test]
    fn test_raster_result_is_pdf_despite_image_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.png");
        let output = dir.path().join("photo-out.png");
        let mut png = std::io::Cursor::new(Vec::new());
        noisy_page(0, 200, 200).pixels.write_to(&mut png, image::ImageOutputFormat::Png).unwrap();
        std::fs::write(&input, png.into_inner()).unwrap();

        let payload = serde_json::json!({
            "input_path": input,
            "output_path": output,
            "band": { "min_kb": 20.0, "max_kb": 40.0, "target_kb": 30.0 },
            "config": { "temp_root": dir.path().join("work"), "ghostscript_path": "/nonexistent/gs" },
        });
        let payload = CString::new(payload.to_string()).unwrap();
        let mut out: *mut c_char = ptr::null_mut();

        let code = unsafe { compression_compress(payload.as_ptr(), &mut out) };
        assert_eq!(code, ErrorCode::Success as c_int);
        let json = unsafe { take_json(out) };
        assert_eq!(json["success"], true, "{}", json);
        assert_eq!(json["method"], "raster-search");
        assert!(std::fs::read(&output).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn test_malformed_payload_returns_error_json() {
        let payload = CString::new("{\"input_path\": 42}").unwrap();
        let mut out: *mut c_char = ptr::null_mut();
        let code = unsafe { compression_compress(payload.as_ptr(), &mut out) };
        assert_eq!(code, ErrorCode::Success as c_int);
        let json = unsafe { take_json(out) };
        assert_eq!(json["code"], "InvalidArgument");
    }

    #[test]
    fn test_null_payload() {
        let mut out: *mut c_char = ptr::null_mut();
        let code = unsafe { compression_compress(ptr::null(), &mut out) };
        assert_eq!(code, ErrorCode::Success as c_int);
        let json = unsafe { take_json(out) };
        assert_eq!(json["code"], "NullPointer");
    }

    #[test]
    fn test_detect_external_tool_reports_json() {
        let mut out: *mut c_char = ptr::null_mut();
        let code = unsafe { compression_detect_external_tool(&mut out) };
        assert_eq!(code, ErrorCode::Success as c_int);
        let json = unsafe { take_json(out) };
        assert!(json["available"].is_boolean());
        assert!(json["path"].is_string());
    }
}
