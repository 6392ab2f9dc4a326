#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
#[cfg(not(feature = "storage-local"))]
use crate::StorageError;
use crate::{Storage, StorageGateway, StorageResult};
use std::sync::Arc;
use vidstream_core::StorageConfig;

/// Create the storage gateway from configuration.
///
/// Local storage is mandatory. The remote backend is optional: when it is not
/// configured, or its client cannot be built, the gateway publishes to local
/// storage only.
pub async fn create_gateway(config: &StorageConfig) -> StorageResult<StorageGateway> {
    let primary = create_primary(config);
    let fallback = create_fallback(config).await?;

    tracing::info!(
        primary = %primary
            .as_ref()
            .map(|p| p.backend_type().to_string())
            .unwrap_or_else(|| "none".to_string()),
        fallback = %fallback.backend_type(),
        concurrency = config.upload_concurrency,
        "Storage gateway initialized"
    );

    Ok(StorageGateway::new(
        primary,
        fallback,
        config.upload_concurrency,
    ))
}

#[cfg(feature = "storage-s3")]
fn create_primary(config: &StorageConfig) -> Option<Arc<dyn Storage>> {
    let remote = config.remote.as_ref()?;
    match S3Storage::new(remote) {
        Ok(storage) => Some(Arc::new(storage)),
        Err(e) => {
            tracing::warn!(
                error = %e,
                bucket = %remote.bucket,
                "Remote storage client could not be built; using local storage only"
            );
            None
        }
    }
}

#[cfg(not(feature = "storage-s3"))]
fn create_primary(config: &StorageConfig) -> Option<Arc<dyn Storage>> {
    if config.remote.is_some() {
        tracing::warn!("Remote storage configured but the storage-s3 feature is not enabled");
    }
    None
}

#[cfg(feature = "storage-local")]
async fn create_fallback(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    let storage = LocalStorage::new(&config.local.path, config.local.base_url.clone()).await?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "storage-local"))]
async fn create_fallback(_config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    Err(StorageError::ConfigError(
        "Local storage backend not available (storage-local feature not enabled)".to_string(),
    ))
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use crate::StorageBackend;
    use tempfile::tempdir;
    use vidstream_core::{LocalStorageConfig, RemoteStorageConfig};

    fn storage_config(path: &std::path::Path, remote: Option<RemoteStorageConfig>) -> StorageConfig {
        StorageConfig {
            remote,
            local: LocalStorageConfig {
                path: path.to_path_buf(),
                base_url: "/uploads".to_string(),
            },
            upload_concurrency: 2,
        }
    }

    #[tokio::test]
    async fn test_gateway_without_remote_uses_local_only() {
        let dir = tempdir().unwrap();
        let gateway = create_gateway(&storage_config(dir.path(), None))
            .await
            .unwrap();
        assert!(!gateway.has_primary());
        assert_eq!(gateway.fallback().backend_type(), StorageBackend::Local);
    }

    #[cfg(feature = "storage-s3")]
    #[tokio::test]
    async fn test_gateway_with_remote_has_primary() {
        let dir = tempdir().unwrap();
        let remote = RemoteStorageConfig {
            bucket: "media".to_string(),
            region: "auto".to_string(),
            endpoint: Some("https://acct.r2.cloudflarestorage.com".to_string()),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            public_url: None,
        };
        let gateway = create_gateway(&storage_config(dir.path(), Some(remote)))
            .await
            .unwrap();
        assert!(gateway.has_primary());
    }
}
