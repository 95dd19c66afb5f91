use std::fmt;
use serde::Serialize;
use thiserror::Error;

/// Domain-level errors raised by the compression engine
#[derive(Debug, Error, Clone, Serialize)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// External compressor missing or its version check failed
    #[error("External tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The input could not be decoded into page rasters
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// A single encode attempt failed
    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Whether the search loop may retry with different parameters after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DomainError::Encoding(_))
    }
}

impl From<std::io::Error> for DomainError {
    fn from(error: std::io::Error) -> Self {
        DomainError::Io(error.to_string())
    }
}

impl From<image::ImageError> for DomainError {
    fn from(error: image::ImageError) -> Self {
        DomainError::Encoding(format!("Image codec error: {}", error))
    }
}

impl From<jpeg_encoder::EncodingError> for DomainError {
    fn from(error: jpeg_encoder::EncodingError) -> Self {
        DomainError::Encoding(format!("JPEG encoding error: {}", error))
    }
}

impl From<lopdf::Error> for DomainError {
    fn from(error: lopdf::Error) -> Self {
        DomainError::Internal(format!("PDF document error: {}", error))
    }
}

/// Service-level errors (async facade and host integration)
#[derive(Debug, Error, Clone, Serialize)]
pub enum ServiceError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

/// Validation errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum ValidationError {
    #[error("Field '{field}' must be between {min} and {max}")]
    Range {
        field: String,
        min: String,
        max: String,
    },

    #[error("Field '{field}' contains an invalid value: {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn range<T: fmt::Display>(field: &str, min: T, max: T) -> Self {
        Self::Range {
            field: field.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
