use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::image_processing::ImageKind;

pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_WIDTH: u32 = 1200;
pub const DEFAULT_QUALITY: u8 = 80;
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("ALLOWED_IMAGE_TYPES contains an unsupported type: {0}")]
    UnsupportedType(String),
    #[error("ALLOWED_IMAGE_TYPES must name at least one type")]
    EmptyAllowList,
}

/// Settings consumed by the upload pipeline.
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub max_width: u32,
    pub quality: u8,
    pub allowed_types: Vec<ImageKind>,
    pub upload_dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_QUALITY,
            allowed_types: ImageKind::ALL.to_vec(),
            upload_dir: default_upload_dir(),
        }
    }
}

impl UploadConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_file_size = match non_empty_var("MAX_FILE_SIZE") {
            Some(value) => parse_positive(&value, "MAX_FILE_SIZE")?,
            None => defaults.max_file_size,
        };
        let max_width = match non_empty_var("MAX_IMAGE_WIDTH") {
            Some(value) => parse_positive::<u32>(&value, "MAX_IMAGE_WIDTH")?,
            None => defaults.max_width,
        };
        let quality = match non_empty_var("IMAGE_QUALITY") {
            Some(value) => parse_quality(&value)?,
            None => defaults.quality,
        };
        let allowed_types = match non_empty_var("ALLOWED_IMAGE_TYPES") {
            Some(value) => parse_allowed_types(&value)?,
            None => defaults.allowed_types,
        };
        let upload_dir = non_empty_var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);
        Ok(Self {
            max_file_size,
            max_width,
            quality,
            allowed_types,
            upload_dir,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub public_base_url: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match non_empty_var("PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                expected: "a port number",
                value,
            })?,
            None => DEFAULT_PORT,
        };
        let bind_address = format!("0.0.0.0:{port}");
        let public_base_url = resolve_public_base_url(non_empty_var("PUBLIC_BASE_URL"), &bind_address);
        Ok(Self {
            bind_address,
            public_base_url,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_positive<T>(value: &str, name: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            name,
            expected: "a positive integer",
            value: value.to_string(),
        }),
    }
}

fn parse_quality(value: &str) -> Result<u8, ConfigError> {
    match value.trim().parse::<u8>() {
        Ok(quality) if (1..=100).contains(&quality) => Ok(quality),
        _ => Err(ConfigError::InvalidValue {
            name: "IMAGE_QUALITY",
            expected: "an integer between 1 and 100",
            value: value.to_string(),
        }),
    }
}

fn parse_allowed_types(value: &str) -> Result<Vec<ImageKind>, ConfigError> {
    let mut kinds = Vec::new();
    for raw in value.split(',').map(str::trim).filter(|raw| !raw.is_empty()) {
        let kind = ImageKind::from_mime(raw).ok_or_else(|| ConfigError::UnsupportedType(raw.to_string()))?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(ConfigError::EmptyAllowList);
    }
    Ok(kinds)
}

fn default_upload_dir() -> PathBuf {
    let mut base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("cellar-images");
    base.push("uploads");
    base
}

fn resolve_public_base_url(configured: Option<String>, bind_address: &str) -> String {
    let raw = configured.unwrap_or_else(|| bind_address.to_string());
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
