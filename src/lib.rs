pub mod config;
pub mod error;
pub mod http;
pub mod image_processing;
pub mod pipeline;
pub mod storage;
pub mod validation;

pub use config::{ServerConfig, UploadConfig};
pub use error::{StorageError, TranscodeError, UploadError};
pub use pipeline::{ImagePipeline, StoredImage, UploadRequest, UploadStage};
pub use storage::{ImageStore, OwnerId};
