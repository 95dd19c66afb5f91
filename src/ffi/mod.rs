// In src/ffi/mod.rs
use std::os::raw::c_char;
use std::ffi::CString;
use crate::ffi::error::{FFIError, ErrorCode};
use serde::Serialize;

// Declare necessary FFI submodules
pub mod error;
pub mod compression;

/// Handles results for FFI functions that return data, serializing Ok(T) or Err(FFIError) to JSON.
/// Returns a pointer to a C string (must be freed by the caller).
pub fn handle_json_result<F, T>(func: F) -> *mut c_char
where
    F: FnOnce() -> FFIResult<T>,
    T: Serialize,
{
    let json_string = match func() {
        Ok(value) => serde_json::to_string(&value),
        Err(ffi_error) => {
            log::warn!("[Rust FFI Error] {}", ffi_error);
            serde_json::to_string(&ffi_error)
        },
    };

    let final_json = match json_string {
        Ok(s) => s,
        Err(e) => {
            // The caller must always be able to parse the response
            let error_msg = format!("Failed to serialize result: {}", e);
            log::error!("[Rust FFI Error] Serialization failed: {}", error_msg);
            serde_json::json!({
                "code": ErrorCode::InternalError,
                "message": error_msg,
                "details": null,
            })
            .to_string()
        }
    };

    match CString::new(final_json) {
        Ok(c_string) => c_string.into_raw(),
        Err(e) => {
            log::error!("[Rust FFI Error] Failed to create CString: {}", e);
            let error = FFIError::from(e);
            serde_json::to_string(&error)
                .ok()
                .and_then(|json| CString::new(json).ok())
                .map_or(std::ptr::null_mut(), |cs| cs.into_raw())
        }
    }
}

/// Convert any error implementing Clone + 'static to FFIError
pub fn to_ffi_error<E: std::error::Error + Clone + 'static>(error: E) -> FFIError {
    crate::ffi::error::to_ffi_error(&error)
}

// Re-export FFIResult for convenience if needed within ffi module
pub use error::FFIResult;
