//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use vidstream_core::AppError;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The fallback backend failed too; nothing usable was published.
    #[error("All storage backends failed (primary: {}, fallback: {fallback})", .primary.as_deref().unwrap_or("not configured"))]
    AllBackendsFailed {
        primary: Option<String>,
        fallback: String,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConfigError(msg) => AppError::Configuration(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) must implement this trait so the
/// gateway can publish an asset without coupling to a specific backend.
///
/// **Key format:** see the crate root documentation.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload data to a specific storage key.
    /// Returns the public URL for the uploaded file.
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Upload a local file to a specific storage key.
    async fn upload_file(
        &self,
        storage_key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<String> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.upload_with_key(storage_key, data, content_type).await
    }

    /// Public location of a key or key prefix.
    ///
    /// A full URL for remote backends, or a path under the static prefix the
    /// HTTP layer serves for local storage.
    fn public_url(&self, storage_key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
