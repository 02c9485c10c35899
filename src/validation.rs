//! Upload validation primitives.
//!
//! Checks run cheapest first: size, then the declared MIME type, then the
//! byte signature. The first failure wins.

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::image_processing::{ImageKind, detect_mime_type};

pub fn check_size(bytes: &[u8], max_size: usize) -> Result<(), UploadError> {
    if bytes.len() > max_size {
        return Err(UploadError::FileTooLarge {
            actual: bytes.len(),
            max: max_size,
        });
    }
    Ok(())
}

pub fn check_declared_type(mime_type: &str, allowed: &[ImageKind]) -> Result<ImageKind, UploadError> {
    match ImageKind::from_mime(mime_type) {
        Some(kind) if allowed.contains(&kind) => Ok(kind),
        _ => Err(UploadError::UnsupportedDeclaredType {
            declared: mime_type.to_string(),
        }),
    }
}

/// Returns the kind detected from the payload's leading bytes. The declared
/// type plays no part here.
pub fn check_signature(bytes: &[u8], allowed: &[ImageKind]) -> Result<ImageKind, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::EmptyFile);
    }
    let detected = detect_mime_type(bytes).ok_or(UploadError::UndetectableType)?;
    match ImageKind::from_mime(detected) {
        Some(kind) if allowed.contains(&kind) => Ok(kind),
        _ => Err(UploadError::UnsupportedDetectedType {
            detected: detected.to_string(),
        }),
    }
}

/// Full validation pass. On success yields the detected kind, which is what
/// the transcoder decodes as.
pub fn validate(bytes: &[u8], declared_mime_type: &str, config: &UploadConfig) -> Result<ImageKind, UploadError> {
    check_size(bytes, config.max_file_size)?;
    let declared = check_declared_type(declared_mime_type, &config.allowed_types)?;
    let detected = check_signature(bytes, &config.allowed_types)?;
    if declared != detected {
        tracing::debug!(
            declared = declared.mime_type(),
            detected = detected.mime_type(),
            "declared type differs from detected type"
        );
    }
    Ok(detected)
}
