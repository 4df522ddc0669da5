//! Upload area for documents awaiting analysis.
//!
//! Files are stored flat under one directory and addressed by their original file name with any
//! directory components removed. Re-uploading a name replaces the previous file.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the upload store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Supplied file name is empty or resolves outside the upload directory.
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),
    /// Filesystem operation failed.
    #[error("Upload storage failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed store for uploaded documents.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Create a store rooted at `root`. The directory is created lazily on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the uploaded files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `bytes` under the sanitized `file_name` and return the identifier.
    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let identifier = sanitize_file_name(file_name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(&identifier);
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(file = %identifier, bytes = bytes.len(), "Stored upload");
        Ok(identifier)
    }

    /// Resolve an identifier to a path, returning `None` when nothing is stored under it.
    pub async fn resolve(&self, identifier: &str) -> Result<Option<PathBuf>, StorageError> {
        let name = sanitize_file_name(identifier)?;
        let path = self.root.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

/// Strip directory components from `raw`, rejecting names that leave nothing usable.
pub(crate) fn sanitize_file_name(raw: &str) -> Result<String, StorageError> {
    let trimmed = raw.trim();
    // Browsers on Windows may send full paths with backslashes.
    let candidate = trimmed.rsplit(['/', '\\']).next().unwrap_or_default();
    match candidate {
        "" | "." | ".." => Err(StorageError::InvalidFileName(raw.to_string())),
        name => Ok(name.to_string()),
    }
}
