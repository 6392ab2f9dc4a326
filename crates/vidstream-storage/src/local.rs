use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Files land under `base_path/{key}`; the HTTP layer serves `base_path` under
/// `base_url`, so the public location of a key is `{base_url}/{key}`.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for published files (e.g., "./uploads")
    /// * `base_url` - Static prefix the files are served under (e.g., "/uploads")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys that could escape the base storage directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.is_empty()
            || storage_key.starts_with('/')
            || storage_key.split('/').any(|part| part == "..")
            || storage_key.contains('\\')
        {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains invalid characters: {}",
                storage_key
            )));
        }

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<String> {
        let path = self.key_to_path(storage_key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(self.public_url(storage_key))
    }

    async fn upload_file(
        &self,
        storage_key: &str,
        source: &Path,
        _content_type: &str,
    ) -> StorageResult<String> {
        let path = self.key_to_path(storage_key)?;
        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let size = fs::copy(source, &path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to copy {} to {}: {}",
                source.display(),
                path.display(),
                e
            ))
        })?;

        tracing::debug!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage file upload successful"
        );

        Ok(self.public_url(storage_key))
    }

    fn public_url(&self, storage_key: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            storage_key.trim_start_matches('/')
        )
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_storage_upload_with_key() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/uploads".to_string())
            .await
            .unwrap();

        let data = b"#EXTM3U\n".to_vec();
        let url = storage
            .upload_with_key("videos/v1/720p/playlist.m3u8", data.clone(), "text/plain")
            .await
            .unwrap();

        assert_eq!(url, "/uploads/videos/v1/720p/playlist.m3u8");
        assert_eq!(
            std::fs::read(dir.path().join("videos/v1/720p/playlist.m3u8")).unwrap(),
            data
        );
    }

    #[tokio::test]
    async fn test_local_storage_upload_file() {
        let dir = tempdir().unwrap();
        let source_dir = tempdir().unwrap();
        let source = source_dir.path().join("segment_0.ts");
        std::fs::write(&source, b"segment bytes").unwrap();

        let storage = LocalStorage::new(dir.path(), "/uploads/".to_string())
            .await
            .unwrap();
        let url = storage
            .upload_file("videos/v1/360p/segment_0.ts", &source, "video/mp2t")
            .await
            .unwrap();

        assert_eq!(url, "/uploads/videos/v1/360p/segment_0.ts");
        assert_eq!(
            std::fs::read(dir.path().join("videos/v1/360p/segment_0.ts")).unwrap(),
            b"segment bytes"
        );
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/uploads".to_string())
            .await
            .unwrap();

        let result = storage
            .upload_with_key("../../../etc/passwd", b"x".to_vec(), "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage
            .upload_with_key("videos/../../etc/passwd", b"x".to_vec(), "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage
            .upload_file("/etc/passwd", Path::new("/dev/null"), "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }
}
