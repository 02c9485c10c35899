//! Error taxonomy for the upload pipeline and its HTTP translation.
//!
//! Validation kinds are operational: they carry enough detail to tell the
//! client exactly what was wrong. Processing and storage failures are shown
//! to clients as a generic "Upload failed" while the full cause chain is
//! logged server-side.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::error::Error as _;
use thiserror::Error;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(
        "File too large: {} exceeds the maximum of {}",
        format_size(*actual),
        format_size(*max)
    )]
    FileTooLarge { actual: usize, max: usize },

    #[error("Unsupported file type: {declared}")]
    UnsupportedDeclaredType { declared: String },

    #[error("Unable to determine the file type from its contents")]
    UndetectableType,

    #[error("File contents are not an accepted image type (detected {detected})")]
    UnsupportedDetectedType { detected: String },

    #[error("File is empty")]
    EmptyFile,

    #[error("Invalid wine identifier: {0:?}")]
    InvalidOwnerId(String),

    #[error("Invalid upload request: {0}")]
    InvalidRequest(String),

    #[error("Image processing failed")]
    Processing(#[from] TranscodeError),

    #[error("Image storage failed")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("decode image failed")]
    Decode(#[source] image::ImageError),
    #[error("encode jpeg failed")]
    Encode(#[source] std::io::Error),
    #[error("write orientation metadata failed: {0}")]
    Metadata(String),
    #[error("transcode task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create upload directory {path}")]
    Init {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to delete {path}")]
    Delete {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Megabytes rounded to two decimals, followed by the exact byte count.
pub fn format_size(bytes: usize) -> String {
    format!("{:.2} MB ({bytes} bytes)", bytes as f64 / BYTES_PER_MEGABYTE)
}

impl UploadError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::FileTooLarge { .. } => "file_too_large",
            UploadError::UnsupportedDeclaredType { .. } => "unsupported_declared_type",
            UploadError::UndetectableType => "undetectable_type",
            UploadError::UnsupportedDetectedType { .. } => "unsupported_detected_type",
            UploadError::EmptyFile => "empty_file",
            UploadError::InvalidOwnerId(_) => "invalid_owner_id",
            UploadError::InvalidRequest(_) => "invalid_request",
            UploadError::Processing(_) => "processing_failure",
            UploadError::Storage(_) => "storage_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::UnsupportedDeclaredType { .. }
            | UploadError::UndetectableType
            | UploadError::UnsupportedDetectedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::EmptyFile | UploadError::InvalidOwnerId(_) | UploadError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            UploadError::Processing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Everything except storage faults is an expected, user-facing outcome.
    pub fn is_operational(&self) -> bool {
        !matches!(self, UploadError::Storage(_))
    }

    /// Message safe to show to the end user.
    pub fn client_message(&self) -> String {
        match self {
            UploadError::Processing(_) | UploadError::Storage(_) => "Upload failed".to_string(),
            other => other.to_string(),
        }
    }

    /// Full cause chain for server-side diagnostics.
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_operational() {
            tracing::warn!(code = self.code(), error = %self.detailed_message(), "upload rejected");
        } else {
            tracing::error!(code = self.code(), error = %self.detailed_message(), "upload failed");
        }
        let body = ErrorResponse {
            error: self.client_message(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}
