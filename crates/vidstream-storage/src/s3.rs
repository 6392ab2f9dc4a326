use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};
use vidstream_core::RemoteStorageConfig;

/// S3-compatible storage implementation (AWS S3, Cloudflare R2, MinIO)
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    public_base_url: Option<String>,
}

impl S3Storage {
    /// Create a new S3Storage instance from a complete remote configuration.
    ///
    /// With a custom endpoint (R2, MinIO) public URLs are path-style unless a
    /// public base URL is configured.
    pub fn new(config: &RemoteStorageConfig) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_region(config.region.clone())
            .with_bucket_name(config.bucket.clone())
            .with_access_key_id(config.access_key_id.clone())
            .with_secret_access_key(config.secret_access_key.clone());

        if let Some(ref endpoint) = config.endpoint {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint_url: config.endpoint.clone(),
            public_base_url: config.public_url.clone(),
        })
    }

    fn base_url(&self) -> String {
        if let Some(ref public) = self.public_base_url {
            public.trim_end_matches('/').to_string()
        } else if let Some(ref endpoint) = self.endpoint_url {
            format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket)
        } else {
            format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region)
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        let size = data.len() as u64;
        let location = Path::from(storage_key.to_string());
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(Bytes::from(data)), opts)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %storage_key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %storage_key,
            content_type = %content_type,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(self.public_url(storage_key))
    }

    fn public_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.base_url(), storage_key.trim_start_matches('/'))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
