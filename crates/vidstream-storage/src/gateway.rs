//! Directory publishing with primary/fallback switching.
//!
//! `StorageGateway` holds a strategy pair fixed at construction: an optional
//! primary (remote) backend and a mandatory fallback (local) backend. Each
//! `upload_directory` call decides on its own which backend serves the result.
//! The first primary failure abandons the primary for the rest of that call and
//! re-walks the full file set against the fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use walkdir::WalkDir;

use crate::content_type::content_type_for;
use crate::keys;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentFile {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Completed,
}

/// Per-file progress of a directory upload. Percent counts files, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub progress: u8,
    pub total_files: usize,
    pub processed_files: usize,
    pub backend: StorageBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<CurrentFile>,
}

/// Receives upload progress. Implemented for any `Fn(UploadProgress)`.
pub trait UploadObserver: Send + Sync {
    fn on_progress(&self, progress: UploadProgress);
}

impl<F> UploadObserver for F
where
    F: Fn(UploadProgress) + Send + Sync,
{
    fn on_progress(&self, progress: UploadProgress) {
        self(progress)
    }
}

/// Result of one `upload_directory` call. Always describes a single backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Public location of the destination prefix.
    pub public_url: String,
    pub backend: StorageBackend,
    pub files_uploaded: usize,
    /// Whether the primary failed during this call.
    pub fell_back: bool,
}

impl UploadOutcome {
    /// Public location of a file under the uploaded prefix.
    pub fn url_for(&self, relative: &str) -> String {
        keys::join(&self.public_url, relative)
    }
}

#[derive(Debug, Clone)]
struct LocalFile {
    path: PathBuf,
    relative: String,
    size: u64,
    content_type: &'static str,
}

pub struct StorageGateway {
    primary: Option<Arc<dyn Storage>>,
    fallback: Arc<dyn Storage>,
    concurrency: usize,
}

impl StorageGateway {
    pub fn new(
        primary: Option<Arc<dyn Storage>>,
        fallback: Arc<dyn Storage>,
        concurrency: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            concurrency: concurrency.max(1),
        }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn fallback(&self) -> &Arc<dyn Storage> {
        &self.fallback
    }

    /// Upload every file under `local_dir` to `{prefix}/{relative path}`.
    #[tracing::instrument(skip(self, local_dir, observer), fields(local_dir = %local_dir.display()))]
    pub async fn upload_directory(
        &self,
        local_dir: &Path,
        prefix: &str,
        observer: &dyn UploadObserver,
    ) -> StorageResult<UploadOutcome> {
        let files = collect_files(local_dir).await?;
        let start = std::time::Instant::now();

        let mut primary_error = None;
        if let Some(primary) = &self.primary {
            match self.upload_all(primary.as_ref(), &files, prefix, observer).await {
                Ok(()) => {
                    tracing::info!(
                        prefix = %prefix,
                        backend = %primary.backend_type(),
                        files = files.len(),
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "Directory published to primary storage"
                    );
                    return Ok(UploadOutcome {
                        public_url: primary.public_url(prefix),
                        backend: primary.backend_type(),
                        files_uploaded: files.len(),
                        fell_back: false,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        prefix = %prefix,
                        "Primary storage failed, re-publishing to fallback storage"
                    );
                    primary_error = Some(e.to_string());
                }
            }
        } else {
            tracing::debug!(prefix = %prefix, "No primary storage configured, using fallback");
        }

        let fell_back = primary_error.is_some();
        match self
            .upload_all(self.fallback.as_ref(), &files, prefix, observer)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    prefix = %prefix,
                    backend = %self.fallback.backend_type(),
                    files = files.len(),
                    fell_back,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Directory published to fallback storage"
                );
                Ok(UploadOutcome {
                    public_url: self.fallback.public_url(prefix),
                    backend: self.fallback.backend_type(),
                    files_uploaded: files.len(),
                    fell_back,
                })
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    primary_error = primary_error.as_deref().unwrap_or("not configured"),
                    prefix = %prefix,
                    "Fallback storage failed"
                );
                Err(StorageError::AllBackendsFailed {
                    primary: primary_error,
                    fallback: e.to_string(),
                })
            }
        }
    }

    /// One full pass of `files` against `backend`. Returning early on the first
    /// error drops any uploads still in flight.
    async fn upload_all(
        &self,
        backend: &dyn Storage,
        files: &[LocalFile],
        prefix: &str,
        observer: &dyn UploadObserver,
    ) -> StorageResult<()> {
        let total = files.len();
        let backend_type = backend.backend_type();

        // Each upload owns its file so the stream stays `Send` inside spawned tasks.
        let uploads: Vec<BoxFuture<'_, StorageResult<LocalFile>>> = files
            .iter()
            .cloned()
            .map(|file| {
                let key = keys::join(prefix, &file.relative);
                async move {
                    backend
                        .upload_file(&key, &file.path, file.content_type)
                        .await
                        .map(|_| file)
                }
                .boxed()
            })
            .collect();
        let mut uploads = stream::iter(uploads).buffer_unordered(self.concurrency);

        let mut processed = 0usize;
        while let Some(result) = uploads.next().await {
            let file = result?;
            processed += 1;
            observer.on_progress(UploadProgress {
                status: UploadStatus::Uploading,
                file: Some(file.relative.clone()),
                progress: percent_of(processed, total),
                total_files: total,
                processed_files: processed,
                backend: backend_type,
                current_file: Some(CurrentFile {
                    name: file.relative.clone(),
                    size: file.size,
                    content_type: file.content_type.to_string(),
                }),
            });
        }

        observer.on_progress(UploadProgress {
            status: UploadStatus::Completed,
            file: None,
            progress: 100,
            total_files: total,
            processed_files: processed,
            backend: backend_type,
            current_file: None,
        });

        Ok(())
    }
}

fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Enumerate regular files under `dir`, sorted by path.
async fn collect_files(dir: &Path) -> StorageResult<Vec<LocalFile>> {
    let root = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                StorageError::IoError(std::io::Error::other(format!(
                    "Failed to walk {}: {}",
                    root.display(),
                    e
                )))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&root)
                .map_err(|e| StorageError::InvalidKey(e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(LocalFile {
                content_type: content_type_for(entry.path()),
                path: entry.into_path(),
                relative,
                size,
            });
        }
        Ok(files)
    })
    .await
    .map_err(|e| StorageError::BackendError(format!("Directory scan task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Remote stand-in that fails on the n-th upload call.
    struct FlakyStorage {
        fail_on_call: usize,
        calls: AtomicUsize,
        uploaded: Mutex<Vec<String>>,
    }

    impl FlakyStorage {
        fn new(fail_on_call: usize) -> Self {
            Self {
                fail_on_call,
                calls: AtomicUsize::new(0),
                uploaded: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Storage for FlakyStorage {
        async fn upload_with_key(
            &self,
            storage_key: &str,
            _data: Vec<u8>,
            _content_type: &str,
        ) -> StorageResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on_call {
                return Err(StorageError::UploadFailed("connection reset".to_string()));
            }
            self.uploaded.lock().unwrap().push(storage_key.to_string());
            Ok(self.public_url(storage_key))
        }

        fn public_url(&self, storage_key: &str) -> String {
            format!("https://cdn.example.com/{}", storage_key)
        }

        fn backend_type(&self) -> StorageBackend {
            StorageBackend::S3
        }
    }

    fn write_tree(dir: &Path) {
        std::fs::create_dir_all(dir.join("720p")).unwrap();
        std::fs::create_dir_all(dir.join("360p")).unwrap();
        std::fs::write(dir.join("master.m3u8"), b"#EXTM3U\n").unwrap();
        std::fs::write(dir.join("720p/playlist.m3u8"), b"#EXTM3U\n").unwrap();
        std::fs::write(dir.join("720p/segment_0.ts"), b"aaaa").unwrap();
        std::fs::write(dir.join("360p/playlist.m3u8"), b"#EXTM3U\n").unwrap();
        std::fs::write(dir.join("360p/segment_0.ts"), b"bb").unwrap();
    }

    fn collecting_observer() -> (Arc<Mutex<Vec<UploadProgress>>>, impl UploadObserver) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        (events, move |p: UploadProgress| sink.lock().unwrap().push(p))
    }

    #[tokio::test]
    async fn test_primary_failure_republishes_everything_to_fallback() {
        let source = tempdir().unwrap();
        let published = tempdir().unwrap();
        write_tree(source.path());

        let primary = Arc::new(FlakyStorage::new(3));
        let fallback = Arc::new(
            LocalStorage::new(published.path(), "/uploads".to_string())
                .await
                .unwrap(),
        );
        let gateway = StorageGateway::new(Some(primary.clone() as Arc<dyn Storage>), fallback.clone(), 1);
        let (events, observer) = collecting_observer();

        let outcome = gateway
            .upload_directory(source.path(), "videos/v1", &observer)
            .await
            .unwrap();

        assert_eq!(outcome.public_url, "/uploads/videos/v1");
        assert_eq!(outcome.backend, StorageBackend::Local);
        assert!(outcome.fell_back);
        assert_eq!(outcome.files_uploaded, 5);
        assert_eq!(primary.uploaded.lock().unwrap().len(), 2);

        for relative in [
            "master.m3u8",
            "720p/playlist.m3u8",
            "720p/segment_0.ts",
            "360p/playlist.m3u8",
            "360p/segment_0.ts",
        ] {
            assert_eq!(
                std::fs::read(published.path().join("videos/v1").join(relative)).unwrap(),
                std::fs::read(source.path().join(relative)).unwrap(),
                "fallback copy of {} differs",
                relative
            );
        }

        let events = events.lock().unwrap();
        let local: Vec<_> = events
            .iter()
            .filter(|p| p.backend == StorageBackend::Local && p.status == UploadStatus::Uploading)
            .collect();
        assert_eq!(local.len(), 5);
        assert_eq!(local.last().unwrap().progress, 100);
        assert_eq!(local.last().unwrap().processed_files, 5);
        assert_eq!(events.last().unwrap().status, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn test_healthy_primary_is_used() {
        let source = tempdir().unwrap();
        let published = tempdir().unwrap();
        write_tree(source.path());

        let primary = Arc::new(FlakyStorage::new(usize::MAX));
        let fallback = Arc::new(
            LocalStorage::new(published.path(), "/uploads".to_string())
                .await
                .unwrap(),
        );
        let gateway = StorageGateway::new(Some(primary.clone() as Arc<dyn Storage>), fallback.clone(), 4);

        let outcome = gateway
            .upload_directory(source.path(), "videos/v1", &|_: UploadProgress| {})
            .await
            .unwrap();

        assert_eq!(outcome.public_url, "https://cdn.example.com/videos/v1");
        assert_eq!(
            outcome.url_for("master.m3u8"),
            "https://cdn.example.com/videos/v1/master.m3u8"
        );
        assert!(!outcome.fell_back);
        assert_eq!(primary.uploaded.lock().unwrap().len(), 5);
        assert!(!published.path().join("videos/v1/master.m3u8").exists());
    }

    #[tokio::test]
    async fn test_no_primary_goes_straight_to_fallback() {
        let source = tempdir().unwrap();
        let published = tempdir().unwrap();
        write_tree(source.path());

        let fallback = Arc::new(
            LocalStorage::new(published.path(), "/uploads".to_string())
                .await
                .unwrap(),
        );
        let gateway = StorageGateway::new(None, fallback, 2);
        let (events, observer) = collecting_observer();

        let outcome = gateway
            .upload_directory(source.path(), "videos/v2", &observer)
            .await
            .unwrap();

        assert_eq!(outcome.backend, StorageBackend::Local);
        assert!(!outcome.fell_back);

        let events = events.lock().unwrap();
        let first = &events[0];
        let current = first.current_file.as_ref().unwrap();
        assert_eq!(first.total_files, 5);
        assert_eq!(first.progress, 20);
        assert!(!current.content_type.is_empty());

        let json = serde_json::to_value(first).unwrap();
        assert!(json.get("totalFiles").is_some());
        assert!(json["currentFile"].get("type").is_some());
    }

    #[tokio::test]
    async fn test_upload_directory_runs_in_spawned_task() {
        let source = tempdir().unwrap();
        let published = tempdir().unwrap();
        write_tree(source.path());

        let primary = Arc::new(FlakyStorage::new(2));
        let fallback = Arc::new(
            LocalStorage::new(published.path(), "/uploads".to_string())
                .await
                .unwrap(),
        );
        let gateway = Arc::new(StorageGateway::new(
            Some(primary as Arc<dyn Storage>),
            fallback,
            3,
        ));
        let source_path = source.path().to_path_buf();

        let outcome = tokio::spawn(async move {
            let observer = |_: UploadProgress| {};
            gateway
                .upload_directory(&source_path, "videos/v4", &observer)
                .await
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(outcome.backend, StorageBackend::Local);
        assert_eq!(outcome.files_uploaded, 5);
        assert!(published.path().join("videos/v4/360p/segment_0.ts").exists());
    }

    #[tokio::test]
    async fn test_both_backends_failing_is_an_error() {
        let source = tempdir().unwrap();
        write_tree(source.path());

        let gateway = StorageGateway::new(
            Some(Arc::new(FlakyStorage::new(1)) as Arc<dyn Storage>),
            Arc::new(FlakyStorage::new(2)),
            1,
        );

        let result = gateway
            .upload_directory(source.path(), "videos/v3", &|_: UploadProgress| {})
            .await;

        match result {
            Err(StorageError::AllBackendsFailed { primary, fallback }) => {
                assert!(primary.unwrap().contains("connection reset"));
                assert!(fallback.contains("connection reset"));
            }
            other => panic!("expected AllBackendsFailed, got {:?}", other.map(|o| o.backend)),
        }
    }
}
