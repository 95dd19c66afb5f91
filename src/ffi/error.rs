// Content for src/ffi/error.rs
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::errors::{DomainError, ServiceError, ValidationError};

/// Error codes for FFI boundary
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Success (no error)
    Success = 0,

    // General errors (1-99)
    Unknown = 1,
    InvalidArgument = 2,
    NullPointer = 3,
    InvalidUtf8 = 4,
    InternalError = 6,

    // Domain errors (200-299)
    DomainGeneral = 200,
    ValidationFailed = 204,
    FileError = 207,
    CompressionError = 208,
    ExtractionFailed = 209,
    ToolUnavailable = 210,

    // Service errors (300-399)
    ServiceGeneral = 300,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as i32)
    }
}

/// Error type for FFI boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FFIError {
    /// Error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (JSON string)
    pub details: Option<String>,
}

impl fmt::Display for FFIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(details) = &self.details {
            write!(f, "{}: {} ({})", self.code, self.message, details)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for FFIError {}

impl FFIError {
    pub fn new(code: ErrorCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: &str, details: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            details: Some(details.to_string()),
        }
    }

    pub fn unknown(message: &str) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

}

// --- From<DomainError> for FFIError ---
impl From<DomainError> for FFIError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(validation_err) => validation_err.into(),
            DomainError::ToolUnavailable(msg) => Self::new(ErrorCode::ToolUnavailable, &msg),
            DomainError::Extraction(msg) => Self::new(ErrorCode::ExtractionFailed, &msg),
            DomainError::Encoding(msg) => Self::new(ErrorCode::CompressionError, &msg),
            DomainError::Io(msg) => Self::new(ErrorCode::FileError, &msg),
            DomainError::Internal(msg) => Self::new(ErrorCode::InternalError, &msg),
        }
    }
}

// --- From<ServiceError> for FFIError ---
impl From<ServiceError> for FFIError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Domain(domain_err) => {
                domain_err.into() // Delegate
            },
            ServiceError::TaskJoin(msg) => {
                Self::with_details(ErrorCode::ServiceGeneral, "Background compression task failed", &msg)
            },
        }
    }
}

impl From<ValidationError> for FFIError {
    fn from(err: ValidationError) -> Self {
        let details = match &err {
            ValidationError::Range { field, min, max } => {
                format!("{{\"field\":\"{}\",\"min\":\"{}\",\"max\":\"{}\"}}", field, min, max)
            },
            ValidationError::InvalidValue { field, reason } => {
                format!("{{\"field\":\"{}\",\"reason\":\"{}\"}}", field, reason)
            },
        };
        Self::with_details(ErrorCode::ValidationFailed, &err.to_string(), &details)
    }
}

// Implement From<std::ffi::NulError> for FFIError
impl From<std::ffi::NulError> for FFIError {
    fn from(_: std::ffi::NulError) -> Self {
        Self::new(ErrorCode::InvalidUtf8, "String contains null bytes, cannot create CString")
    }
}

/// Helper function to convert any Rust error to FFIError for C boundary
pub fn to_ffi_error<E: std::error::Error + 'static>(error: &E) -> FFIError {
    // Explicitly cast to &dyn Error before downcasting.
    let error_trait_object = error as &dyn std::error::Error;

    if let Some(ffi_err) = error_trait_object.downcast_ref::<FFIError>() {
        return ffi_err.clone();
    }
    if let Some(service_err) = error_trait_object.downcast_ref::<ServiceError>() {
        return service_err.clone().into();
    }
    if let Some(domain_err) = error_trait_object.downcast_ref::<DomainError>() {
        return domain_err.clone().into();
    }
    if let Some(validation_err) = error_trait_object.downcast_ref::<ValidationError>() {
        return validation_err.clone().into();
    }

    // Default case for unknown errors
    FFIError::unknown(&error.to_string())
}

// Result type alias for FFI functions
pub type FFIResult<T> = Result<T, FFIError>;
