use std::collections::HashMap;

use tokio::sync::RwLock;
use vidstream_core::models::{ProgressStage, Variant, VideoAsset};
use vidstream_core::{AppError, StorageBackend, VideoId};

/// Trait for video metadata operations
#[async_trait::async_trait]
pub trait VideoRepository: Send + Sync {
    async fn create(&self, video: VideoAsset) -> Result<VideoAsset, AppError>;

    async fn get(&self, id: &VideoId) -> Result<Option<VideoAsset>, AppError>;

    /// Newest first.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<VideoAsset>, AppError>;

    async fn mark_processing(&self, id: &VideoId) -> Result<VideoAsset, AppError>;

    /// Returns whether the stored percent advanced.
    async fn record_progress(&self, id: &VideoId, percent: u8) -> Result<bool, AppError>;

    async fn complete(
        &self,
        id: &VideoId,
        manifest_url: String,
        variants: Vec<Variant>,
        backend: StorageBackend,
    ) -> Result<VideoAsset, AppError>;

    async fn fail(
        &self,
        id: &VideoId,
        stage: ProgressStage,
        error: String,
    ) -> Result<VideoAsset, AppError>;

    /// Remove a record whose upload never completed. Returns whether it existed.
    async fn delete(&self, id: &VideoId) -> Result<bool, AppError>;
}

#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: RwLock<HashMap<VideoId, VideoAsset>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: &VideoId, apply: F) -> Result<VideoAsset, AppError>
    where
        F: FnOnce(&mut VideoAsset) -> Result<(), AppError> + Send,
    {
        let mut videos = self.videos.write().await;
        let video = videos
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Video not found: {}", id)))?;
        apply(video)?;
        Ok(video.clone())
    }
}

#[async_trait::async_trait]
impl VideoRepository for InMemoryVideoRepository {
    #[tracing::instrument(skip(self, video), fields(video_id = %video.id, db.operation = "insert"))]
    async fn create(&self, video: VideoAsset) -> Result<VideoAsset, AppError> {
        let mut videos = self.videos.write().await;
        if videos.contains_key(&video.id) {
            return Err(AppError::InvalidInput(format!(
                "Video already exists: {}",
                video.id
            )));
        }
        videos.insert(video.id.clone(), video.clone());
        Ok(video)
    }

    async fn get(&self, id: &VideoId) -> Result<Option<VideoAsset>, AppError> {
        Ok(self.videos.read().await.get(id).cloned())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<VideoAsset>, AppError> {
        let videos = self.videos.read().await;
        let mut owned: Vec<VideoAsset> = videos
            .values()
            .filter(|v| v.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn mark_processing(&self, id: &VideoId) -> Result<VideoAsset, AppError> {
        self.update(id, |video| video.start_processing()).await
    }

    async fn record_progress(&self, id: &VideoId, percent: u8) -> Result<bool, AppError> {
        let mut videos = self.videos.write().await;
        let video = videos
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Video not found: {}", id)))?;
        Ok(video.record_progress(percent))
    }

    #[tracing::instrument(skip(self, variants), fields(video_id = %id, db.operation = "update"))]
    async fn complete(
        &self,
        id: &VideoId,
        manifest_url: String,
        variants: Vec<Variant>,
        backend: StorageBackend,
    ) -> Result<VideoAsset, AppError> {
        self.update(id, move |video| video.complete(manifest_url, variants, backend))
            .await
    }

    #[tracing::instrument(skip(self), fields(video_id = %id, db.operation = "update"))]
    async fn fail(
        &self,
        id: &VideoId,
        stage: ProgressStage,
        error: String,
    ) -> Result<VideoAsset, AppError> {
        self.update(id, move |video| video.fail(stage, error)).await
    }

    async fn delete(&self, id: &VideoId) -> Result<bool, AppError> {
        Ok(self.videos.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidstream_core::models::VideoStatus;

    fn id(raw: &str) -> VideoId {
        VideoId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_to_completed() {
        let repo = InMemoryVideoRepository::new();
        repo.create(VideoAsset::new(id("v1"), "Clip", "alice"))
            .await
            .unwrap();

        repo.mark_processing(&id("v1")).await.unwrap();
        assert!(repo.record_progress(&id("v1"), 30).await.unwrap());
        assert!(!repo.record_progress(&id("v1"), 10).await.unwrap());

        let done = repo
            .complete(
                &id("v1"),
                "/uploads/videos/v1/master.m3u8".to_string(),
                vec![],
                StorageBackend::Local,
            )
            .await
            .unwrap();
        assert_eq!(done.status, VideoStatus::Completed);
        assert_eq!(done.storage_backend, Some(StorageBackend::Local));

        let stored = repo.get(&id("v1")).await.unwrap().unwrap();
        assert_eq!(
            stored.manifest_url.as_deref(),
            Some("/uploads/videos/v1/master.m3u8")
        );
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let repo = InMemoryVideoRepository::new();
        repo.create(VideoAsset::new(id("v2"), "Clip", "alice"))
            .await
            .unwrap();

        let err = repo.fail(&id("v2"), ProgressStage::Analysis, "boom".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition { .. }));

        repo.mark_processing(&id("v2")).await.unwrap();
        repo.fail(&id("v2"), ProgressStage::Analysis, "boom".to_string()).await.unwrap();
        assert!(repo
            .complete(&id("v2"), "x".to_string(), vec![], StorageBackend::Local)
            .await
            .is_err());
        let stored = repo.get(&id("v2")).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert_eq!(stored.failed_stage, Some(ProgressStage::Analysis));
        assert!(stored.manifest_url.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_and_missing() {
        let repo = InMemoryVideoRepository::new();
        repo.create(VideoAsset::new(id("v3"), "Clip", "alice"))
            .await
            .unwrap();
        assert!(repo
            .create(VideoAsset::new(id("v3"), "Again", "alice"))
            .await
            .is_err());
        assert!(matches!(
            repo.mark_processing(&id("missing")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(repo.delete(&id("v3")).await.unwrap());
        assert!(!repo.delete(&id("v3")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let repo = InMemoryVideoRepository::new();
        repo.create(VideoAsset::new(id("a1"), "One", "alice"))
            .await
            .unwrap();
        repo.create(VideoAsset::new(id("b1"), "Two", "bob"))
            .await
            .unwrap();
        repo.create(VideoAsset::new(id("a2"), "Three", "alice"))
            .await
            .unwrap();

        let alice = repo.list_by_owner("alice").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|v| v.owner == "alice"));
    }
}
