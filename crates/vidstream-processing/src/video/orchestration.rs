//! Transcode orchestration: probe -> plan -> encode each variant -> master playlist.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use vidstream_core::models::{ProgressStage, SourceMetadata, Variant};
use vidstream_core::AppError;
use vidstream_storage::keys::MASTER_PLAYLIST;

use super::encoder::{EncodeJob, Encoder, ProgressSink};
use super::planner::VariantPlanner;
use super::probe::SourceProbe;
use crate::playlist::PlaylistBuilder;
use crate::progress::ProgressHandle;

/// Folds per-variant encoder progress into one overall percent.
///
/// For variant `index` of `total`, overall = round((index * 100 + pct) / total).
/// Only strictly increasing whole percents are published.
pub struct ProgressAggregator {
    total: usize,
    last: Mutex<Option<u8>>,
    handle: ProgressHandle,
}

impl ProgressAggregator {
    pub fn new(total: usize, handle: ProgressHandle) -> Self {
        Self {
            total: total.max(1),
            last: Mutex::new(None),
            handle,
        }
    }

    /// Returns the percent that was published, if any.
    pub fn report(&self, index: usize, variant_percent: f64) -> Option<u8> {
        let variant_percent = if variant_percent.is_finite() {
            variant_percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let overall = ((index as f64 * 100.0 + variant_percent) / self.total as f64)
            .round()
            .clamp(0.0, 100.0) as u8;

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|previous| overall <= previous) {
            return None;
        }
        *last = Some(overall);
        drop(last);

        self.handle.percent(ProgressStage::Transcoding, overall);
        Some(overall)
    }
}

struct VariantSink<'a> {
    aggregator: &'a ProgressAggregator,
    index: usize,
}

impl ProgressSink for VariantSink<'_> {
    fn report(&self, percent: f64) {
        self.aggregator.report(self.index, percent);
    }
}

/// Rendered asset tree, ready for publishing.
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    pub output_dir: PathBuf,
    pub variants: Vec<Variant>,
    pub master_playlist: PathBuf,
    pub metadata: SourceMetadata,
}

pub struct TranscodeOrchestrator {
    probe: Arc<dyn SourceProbe>,
    encoder: Arc<dyn Encoder>,
    planner: VariantPlanner,
    segment_duration: u32,
}

impl TranscodeOrchestrator {
    pub fn new(
        probe: Arc<dyn SourceProbe>,
        encoder: Arc<dyn Encoder>,
        planner: VariantPlanner,
        segment_duration: u32,
    ) -> Self {
        Self {
            probe,
            encoder,
            planner,
            segment_duration,
        }
    }

    /// Render every planned variant of `source` under `output_dir`.
    ///
    /// Publishes `started`/`completed` events for the analysis, transcoding and
    /// playlist stages. Failures are returned, not published: the caller owns the
    /// terminal event.
    #[tracing::instrument(skip(self, progress), fields(video_id = %progress.video_id()))]
    pub async fn transcode(
        &self,
        source: &Path,
        output_dir: &Path,
        progress: &ProgressHandle,
    ) -> Result<TranscodeOutput, AppError> {
        progress.started(ProgressStage::Analysis);
        let metadata = self
            .probe
            .probe(source)
            .await
            .map_err(|e| AppError::AnalysisFailed(format!("{:#}", e)))?;
        if metadata.height == 0 || metadata.width == 0 {
            return Err(AppError::AnalysisFailed(
                "source has no usable video dimensions".to_string(),
            ));
        }
        let specs = self.planner.plan(&metadata)?;
        progress.completed(
            ProgressStage::Analysis,
            Some(serde_json::json!({
                "duration": metadata.duration,
                "width": metadata.width,
                "height": metadata.height,
                "framerate": metadata.framerate,
                "variants": specs.iter().map(|s| s.height).collect::<Vec<_>>(),
            })),
        );

        tracing::info!(
            duration = metadata.duration,
            resolution = %format!("{}x{}", metadata.width, metadata.height),
            variant_count = specs.len(),
            codec = %self.planner.profile().codec,
            "Variants planned"
        );

        progress.started(ProgressStage::Transcoding);
        let aggregator = ProgressAggregator::new(specs.len(), progress.clone());
        let mut variants = Vec::with_capacity(specs.len());

        for (index, spec) in specs.into_iter().enumerate() {
            let height = spec.height;
            let job = EncodeJob {
                input: source.to_path_buf(),
                output_dir: output_dir.join(spec.directory_name()),
                spec,
                duration_secs: metadata.duration,
                segment_duration: self.segment_duration,
            };

            let sink = VariantSink {
                aggregator: &aggregator,
                index,
            };
            self.encoder
                .encode(&job, &sink)
                .await
                .map_err(|e| AppError::TranscodeFailed {
                    height,
                    message: format!("{:#}", e),
                })?;

            if !tokio::fs::try_exists(job.playlist_path()).await.unwrap_or(false) {
                return Err(AppError::TranscodeFailed {
                    height,
                    message: "encoder produced no variant playlist".to_string(),
                });
            }

            aggregator.report(index, 100.0);
            tracing::info!(height, "Variant transcoded");
            variants.push(job.spec.to_variant());
        }
        progress.completed(ProgressStage::Transcoding, None);

        progress.started(ProgressStage::Playlist);
        let master_playlist = output_dir.join(MASTER_PLAYLIST);
        tokio::fs::write(&master_playlist, PlaylistBuilder::build(&variants))
            .await
            .map_err(|e| AppError::PlaylistFailed(e.to_string()))?;
        progress.completed(ProgressStage::Playlist, None);

        Ok(TranscodeOutput {
            output_dir: output_dir.to_path_buf(),
            variants,
            master_playlist,
            metadata,
        })
    }
}
