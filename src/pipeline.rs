use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::UploadConfig;
use crate::error::{TranscodeError, UploadError};
use crate::image_processing::{self, CANONICAL_MIME_TYPE, TranscodeOptions};
use crate::storage::{ImageStore, OwnerId};
use crate::validation;

/// One label-photo upload, as handed over by the HTTP layer.
#[derive(Debug)]
pub struct UploadRequest {
    pub owner_id: String,
    pub bytes: Vec<u8>,
    pub declared_mime_type: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub owner_id: String,
    pub file_name: String,
    pub byte_size: usize,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub sha256: String,
    pub stored_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStage {
    Received,
    Validating,
    Transcoding,
    Storing,
    Stored,
    /// Terminal: validation turned the upload away, nothing was transcoded.
    Rejected,
    /// Terminal: transcoding or storing failed after validation passed.
    Failed,
}

impl UploadStage {
    /// Terminal stage an upload ends in when it fails with `err`.
    pub fn terminal_for(err: &UploadError) -> UploadStage {
        match err {
            UploadError::Processing(_) | UploadError::Storage(_) => UploadStage::Failed,
            _ => UploadStage::Rejected,
        }
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStage::Received => "received",
            UploadStage::Validating => "validating",
            UploadStage::Transcoding => "transcoding",
            UploadStage::Storing => "storing",
            UploadStage::Stored => "stored",
            UploadStage::Rejected => "rejected",
            UploadStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Validate, transcode, store. Holds no per-request state, so one instance
/// serves any number of concurrent uploads.
#[derive(Clone, Debug)]
pub struct ImagePipeline {
    config: Arc<UploadConfig>,
    store: ImageStore,
}

impl ImagePipeline {
    pub fn new(config: UploadConfig, store: ImageStore) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }

    /// Opens the store at `config.upload_dir` and builds the pipeline.
    pub async fn from_config(config: UploadConfig) -> Result<Self, UploadError> {
        let store = ImageStore::open(config.upload_dir.clone()).await?;
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<StoredImage, UploadError> {
        let owner_id = request.owner_id.clone();
        let result = self.run_upload(request).await;
        if let Err(err) = &result {
            tracing::debug!(
                owner = %owner_id,
                stage = %UploadStage::terminal_for(err),
                code = err.code(),
                "upload stage"
            );
        }
        result
    }

    async fn run_upload(&self, request: UploadRequest) -> Result<StoredImage, UploadError> {
        let UploadRequest {
            owner_id,
            bytes,
            declared_mime_type,
        } = request;
        let owner = OwnerId::parse(&owner_id)?;
        trace_stage(&owner, UploadStage::Received);

        trace_stage(&owner, UploadStage::Validating);
        let kind = validation::validate(&bytes, &declared_mime_type, &self.config)?;

        trace_stage(&owner, UploadStage::Transcoding);
        let options = TranscodeOptions {
            max_width: self.config.max_width,
            quality: self.config.quality,
        };
        let transcoded = tokio::task::spawn_blocking(move || {
            image_processing::transcode(&bytes, kind, options)
        })
        .await
        .map_err(|err| TranscodeError::Task(err.to_string()))??;

        trace_stage(&owner, UploadStage::Storing);
        self.store.write(&owner, &transcoded.bytes).await?;

        let stored = StoredImage {
            owner_id: owner.to_string(),
            file_name: ImageStore::file_name(&owner),
            byte_size: transcoded.bytes.len(),
            mime_type: CANONICAL_MIME_TYPE,
            width: transcoded.width,
            height: transcoded.height,
            sha256: hex::encode(Sha256::digest(&transcoded.bytes)),
            stored_at: Utc::now(),
        };
        tracing::info!(
            owner = %owner,
            stage = %UploadStage::Stored,
            file_name = %stored.file_name,
            size_bytes = stored.byte_size,
            width = stored.width,
            height = stored.height,
            "image stored"
        );
        Ok(stored)
    }

    pub async fn delete(&self, owner_id: &str) -> Result<(), UploadError> {
        let owner = OwnerId::parse(owner_id)?;
        self.store.delete(&owner).await?;
        Ok(())
    }

    pub async fn exists(&self, owner_id: &str) -> Result<bool, UploadError> {
        let owner = OwnerId::parse(owner_id)?;
        Ok(self.store.exists(&owner).await)
    }
}

fn trace_stage(owner: &OwnerId, stage: UploadStage) {
    tracing::debug!(owner = %owner, stage = %stage, "upload stage");
}
