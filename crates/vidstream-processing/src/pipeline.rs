//! End-to-end wiring: upload session -> reassembly -> transcode -> publish.
//!
//! `VideoPipeline` owns the session store, the transcode orchestrator, the
//! storage gateway and the progress broadcaster for the lifetime of the service.
//! It is the only component that publishes a terminal progress event and the
//! only one that moves the asset record to `completed` or `failed`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vidstream_core::models::{
    ChunkUploadResponse, InitUploadRequest, ProgressStage, VideoAsset,
};
use vidstream_core::{AppError, Config, UploadError, VideoId};
use vidstream_db::VideoRepository;
use vidstream_storage::gateway::UploadProgress;
use vidstream_storage::keys::{self, MASTER_PLAYLIST};
use vidstream_storage::{create_gateway, StorageGateway, UploadOutcome};

use crate::progress::{ProgressBroadcaster, ProgressHandle};
use crate::upload::{AssembledUpload, ChunkReceiver, FragmentOutcome, UploadHint};
use crate::video::{
    FfmpegEncoder, FfprobeProbe, TranscodeOrchestrator, TranscodeOutput, VariantPlanner,
};

struct Published {
    output: TranscodeOutput,
    outcome: UploadOutcome,
}

pub struct VideoPipeline {
    receiver: ChunkReceiver,
    orchestrator: TranscodeOrchestrator,
    gateway: StorageGateway,
    repository: Arc<dyn VideoRepository>,
    progress: Arc<ProgressBroadcaster>,
    work_dir: PathBuf,
}

impl VideoPipeline {
    pub fn new(
        receiver: ChunkReceiver,
        orchestrator: TranscodeOrchestrator,
        gateway: StorageGateway,
        repository: Arc<dyn VideoRepository>,
        progress: Arc<ProgressBroadcaster>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            receiver,
            orchestrator,
            gateway,
            repository,
            progress,
            work_dir: work_dir.into(),
        }
    }

    /// Build the production pipeline: ffprobe/ffmpeg, configured storage backends.
    pub async fn from_config(
        config: &Config,
        repository: Arc<dyn VideoRepository>,
    ) -> Result<Self, AppError> {
        let probe = FfprobeProbe::new(config.video.ffprobe_path.clone())
            .map_err(|e| AppError::Configuration(format!("{:#}", e)))?;
        let encoder = FfmpegEncoder::new(
            config.video.ffmpeg_path.clone(),
            config.video.encoding.clone(),
        );
        let planner = VariantPlanner::from_config(&config.video);
        tracing::info!(
            codec = %planner.profile().codec,
            resolutions = ?config.video.resolutions,
            "Transcode profile selected"
        );

        let orchestrator = TranscodeOrchestrator::new(
            Arc::new(probe),
            Arc::new(encoder),
            planner,
            config.video.segment_duration,
        );
        let gateway = create_gateway(&config.storage).await?;
        let receiver = ChunkReceiver::new(
            config.upload.fragment_dir.clone(),
            config.upload.assembled_dir.clone(),
            config.upload.session_timeout,
        );

        tokio::fs::create_dir_all(&config.upload.work_dir).await?;

        Ok(Self::new(
            receiver,
            orchestrator,
            gateway,
            repository,
            Arc::new(ProgressBroadcaster::new(config.progress.channel_capacity)),
            config.upload.work_dir.clone(),
        ))
    }

    pub fn progress(&self) -> &Arc<ProgressBroadcaster> {
        &self.progress
    }

    pub fn repository(&self) -> &Arc<dyn VideoRepository> {
        &self.repository
    }

    pub fn receiver(&self) -> &ChunkReceiver {
        &self.receiver
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    /// Open an upload session and its asset record.
    #[tracing::instrument(skip(self, request), fields(video_id = %request.video_id, size = request.size))]
    pub async fn init_upload(
        &self,
        request: InitUploadRequest,
        owner: String,
    ) -> Result<VideoAsset, AppError> {
        let title = request.resolved_title();
        let video_id = request.video_id.clone();

        self.receiver
            .begin(
                video_id.clone(),
                request.size,
                UploadHint {
                    filename: request.filename,
                    title: title.clone(),
                    owner: owner.clone(),
                },
            )
            .await?;

        match self
            .repository
            .create(VideoAsset::new(video_id.clone(), title, owner))
            .await
        {
            Ok(video) => Ok(video),
            Err(e) => {
                if let Err(abort_err) = self.receiver.abort(&video_id).await {
                    tracing::warn!(error = %abort_err, "Failed to abort upload session");
                }
                Err(e)
            }
        }
    }

    /// Accept one fragment. Completing the upload starts processing in the
    /// background.
    pub async fn receive_chunk(
        self: &Arc<Self>,
        video_id: &VideoId,
        offset: u64,
        total: Option<u64>,
        data: &[u8],
    ) -> Result<ChunkUploadResponse, AppError> {
        let outcome = self.receiver.accept(video_id, offset, total, data).await;
        match outcome {
            Ok(FragmentOutcome::Partial { received, total }) => {
                Ok(ChunkUploadResponse { received, total })
            }
            Ok(FragmentOutcome::Complete(upload)) => {
                let response = ChunkUploadResponse {
                    received: upload.size,
                    total: upload.size,
                };
                self.spawn_processing(upload);
                Ok(response)
            }
            Err(e) => {
                if matches!(e, UploadError::IncompleteUpload { .. }) {
                    self.discard_record(video_id).await;
                }
                Err(e.into())
            }
        }
    }

    /// Declare the upload finished. Succeeds only when every declared byte has
    /// arrived; otherwise the session and its record are discarded.
    pub async fn finish_upload(
        self: &Arc<Self>,
        video_id: &VideoId,
    ) -> Result<ChunkUploadResponse, AppError> {
        match self.receiver.finish(video_id).await {
            Ok(upload) => {
                let response = ChunkUploadResponse {
                    received: upload.size,
                    total: upload.size,
                };
                self.spawn_processing(upload);
                Ok(response)
            }
            Err(e) => {
                if matches!(e, UploadError::IncompleteUpload { .. }) {
                    self.discard_record(video_id).await;
                }
                Err(e.into())
            }
        }
    }

    pub async fn abort_upload(&self, video_id: &VideoId) -> Result<(), AppError> {
        self.receiver.abort(video_id).await?;
        self.discard_record(video_id).await;
        Ok(())
    }

    /// Abort sessions past their timeout and drop their records.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> Vec<VideoId> {
        let reaped = self.receiver.reap_expired(now).await;
        for video_id in &reaped {
            self.discard_record(video_id).await;
        }
        reaped
    }

    async fn discard_record(&self, video_id: &VideoId) {
        if let Err(e) = self.repository.delete(video_id).await {
            tracing::warn!(video_id = %video_id, error = %e, "Failed to delete video record");
        }
    }

    fn spawn_processing(self: &Arc<Self>, upload: AssembledUpload) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            // Outcome is recorded on the asset and published as the terminal event.
            let _ = pipeline.process(upload).await;
        });
    }

    /// Transcode and publish a reassembled upload, then settle the asset record.
    ///
    /// Emits exactly one terminal progress event. The source file and the work
    /// directory are removed afterwards whatever the outcome.
    #[tracing::instrument(skip(self, upload), fields(video_id = %upload.video_id, size = upload.size))]
    pub async fn process(&self, upload: AssembledUpload) -> Result<VideoAsset, AppError> {
        let start = std::time::Instant::now();
        let video_id = upload.video_id.clone();
        let work_dir = self.work_dir.join(video_id.as_str());

        let (percent_tx, percent_rx) = watch::channel(0u8);
        let recorder = self.spawn_progress_recorder(video_id.clone(), percent_rx);
        let handle = self
            .progress
            .handle(video_id.clone())
            .with_percent_mirror(percent_tx);

        let published = self.run(&upload, &work_dir, &handle).await;

        // Dropping the last mirror sender ends the recorder.
        drop(handle);
        if let Err(e) = recorder.await {
            tracing::warn!(error = %e, "Progress recorder task failed");
        }

        let terminal = self.progress.handle(video_id.clone());
        let result = match published {
            Ok(published) => self.settle(&video_id, published, &terminal).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(video) => {
                tracing::info!(
                    backend = ?video.storage_backend,
                    variant_count = video.variants.len(),
                    duration_ms = start.elapsed().as_millis(),
                    "Video processing completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e.detailed_message(),
                    stage = ?e.failed_stage(),
                    duration_ms = start.elapsed().as_millis(),
                    "Video processing failed"
                );
                let stage = e.failed_stage();
                if let Err(record_err) =
                    self.repository.fail(&video_id, stage, e.to_string()).await
                {
                    tracing::warn!(error = %record_err, "Failed to record video failure");
                }
                terminal.failed(stage, e.to_string());
            }
        }

        cleanup(&upload.path, &work_dir).await;
        result
    }

    async fn run(
        &self,
        upload: &AssembledUpload,
        work_dir: &Path,
        progress: &ProgressHandle,
    ) -> Result<Published, AppError> {
        self.repository.mark_processing(&upload.video_id).await?;
        tokio::fs::create_dir_all(work_dir).await?;

        let output = self
            .orchestrator
            .transcode(&upload.path, work_dir, progress)
            .await?;

        progress.started(ProgressStage::Upload);
        let observer = |update: UploadProgress| match serde_json::to_value(&update) {
            Ok(payload) => progress.payload(ProgressStage::Upload, payload),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize upload progress"),
        };
        let outcome = self
            .gateway
            .upload_directory(work_dir, &keys::video_prefix(&upload.video_id), &observer)
            .await?;

        Ok(Published { output, outcome })
    }

    async fn settle(
        &self,
        video_id: &VideoId,
        published: Published,
        terminal: &ProgressHandle,
    ) -> Result<VideoAsset, AppError> {
        let Published { output, outcome } = published;
        let manifest_url = outcome.url_for(MASTER_PLAYLIST);

        let video = self
            .repository
            .complete(
                video_id,
                manifest_url.clone(),
                output.variants.clone(),
                outcome.backend,
            )
            .await?;

        terminal.completed(
            ProgressStage::Upload,
            Some(serde_json::json!({
                "masterPlaylistUrl": manifest_url,
                "backend": outcome.backend,
                "variants": output.variants,
            })),
        );
        Ok(video)
    }

    fn spawn_progress_recorder(
        &self,
        video_id: VideoId,
        mut percent_rx: watch::Receiver<u8>,
    ) -> JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            while percent_rx.changed().await.is_ok() {
                let percent = *percent_rx.borrow_and_update();
                if let Err(e) = repository.record_progress(&video_id, percent).await {
                    tracing::debug!(video_id = %video_id, error = %e, "Progress not recorded");
                }
            }
        })
    }
}

async fn cleanup(source: &Path, work_dir: &Path) {
    if let Err(e) = tokio::fs::remove_file(source).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, path = %source.display(), "Failed to remove source file");
        }
    }
    if let Err(e) = tokio::fs::remove_dir_all(work_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, path = %work_dir.display(), "Failed to remove work directory");
        }
    }
}
