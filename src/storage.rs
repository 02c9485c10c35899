use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{StorageError, UploadError};
use crate::image_processing::CANONICAL_EXTENSION;

const MAX_OWNER_ID_LEN: usize = 128;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier of the wine record an image belongs to. Restricted to
/// characters that are safe as a bare file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn parse(raw: &str) -> Result<Self, UploadError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_OWNER_ID_LEN
            && raw
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
        if !valid {
            return Err(UploadError::InvalidOwnerId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local directory holding at most one image per owner, named `{owner}.jpg`.
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Creates the root directory if needed. Run once before serving requests.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|source| StorageError::Init {
            path: root.display().to_string(),
            source,
        })?;
        tracing::info!(root = %root.display(), "image store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_name(owner: &OwnerId) -> String {
        format!("{owner}.{CANONICAL_EXTENSION}")
    }

    pub fn path(&self, owner: &OwnerId) -> PathBuf {
        self.root.join(Self::file_name(owner))
    }

    /// Replaces any existing image for `owner`. The bytes land in a temporary
    /// sibling first and are renamed into place, so readers never see a
    /// partially written file and concurrent writers resolve to the last rename.
    pub async fn write(&self, owner: &OwnerId, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path(owner);
        let temp_path = self.root.join(format!(
            ".{}.{}.{}.tmp",
            Self::file_name(owner),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let write_err = |source| StorageError::Write {
            path: path.display().to_string(),
            source,
        };

        if let Err(source) = write_synced(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(write_err(source));
        }
        if let Err(source) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(write_err(source));
        }
        tracing::debug!(path = %path.display(), size_bytes = data.len(), "image written");
        Ok(())
    }

    /// Removes the image for `owner`. A missing file is not an error.
    pub async fn delete(&self, owner: &OwnerId) -> Result<(), StorageError> {
        let path = self.path(owner);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "image deleted");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Delete {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Advisory probe: any I/O error reads as "does not exist".
    pub async fn exists(&self, owner: &OwnerId) -> bool {
        let path = self.path(owner);
        match fs::metadata(&path).await {
            Ok(metadata) => metadata.is_file(),
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %err, "existence probe failed");
                }
                false
            }
        }
    }

    pub async fn read(&self, owner: &OwnerId) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path(owner);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}
