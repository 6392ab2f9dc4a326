use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::{ProgressStage, VideoId};
use crate::error::AppError;
use crate::StorageBackend;

/// Lifecycle of a video asset.
///
/// Transitions only ever move forward: `uploading -> processing -> completed | failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl VideoStatus {
    pub fn can_transition_to(self, next: VideoStatus) -> bool {
        matches!(
            (self, next),
            (VideoStatus::Uploading, VideoStatus::Processing)
                | (VideoStatus::Processing, VideoStatus::Completed)
                | (VideoStatus::Processing, VideoStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, VideoStatus::Completed | VideoStatus::Failed)
    }
}

impl Display for VideoStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VideoStatus::Uploading => write!(f, "uploading"),
            VideoStatus::Processing => write!(f, "processing"),
            VideoStatus::Completed => write!(f, "completed"),
            VideoStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One finished rendition of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub height: u32,
    pub width: u32,
    pub bitrate_kbps: u32,
    pub buffer_size_kbps: u32,
    /// Bits per second, as advertised in the master playlist.
    pub bandwidth: u64,
    /// Sub-manifest path relative to the asset root, e.g. `720p/playlist.m3u8`.
    pub playlist_path: String,
}

impl Variant {
    /// Display width for a target height at a fixed 16:9 aspect ratio.
    pub fn width_for_height(height: u32) -> u32 {
        (height as f64 * 16.0 / 9.0).round() as u32
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    pub fn directory_name(height: u32) -> String {
        format!("{}p", height)
    }
}

/// Properties of a reassembled source file, as reported by the probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub bitrate: Option<u64>,
    pub framerate: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAsset {
    pub id: VideoId,
    pub title: String,
    pub owner: String,
    pub status: VideoStatus,
    pub progress: u8,
    pub variants: Vec<Variant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_backend: Option<StorageBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage that was running when processing failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<ProgressStage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoAsset {
    pub fn new(id: VideoId, title: impl Into<String>, owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            owner: owner.into(),
            status: VideoStatus::Uploading,
            progress: 0,
            variants: Vec::new(),
            manifest_url: None,
            storage_backend: None,
            error: None,
            failed_stage: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: VideoStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.progress = 0;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start_processing(&mut self) -> Result<(), AppError> {
        self.transition(VideoStatus::Processing)
    }

    /// Record progress within the current status. Regressions are ignored and the
    /// value is clamped to 100; returns whether the stored value changed.
    pub fn record_progress(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if self.status.is_terminal() || percent <= self.progress {
            return false;
        }
        self.progress = percent;
        self.updated_at = Utc::now();
        true
    }

    pub fn complete(
        &mut self,
        manifest_url: String,
        variants: Vec<Variant>,
        backend: StorageBackend,
    ) -> Result<(), AppError> {
        self.transition(VideoStatus::Completed)?;
        self.progress = 100;
        self.manifest_url = Some(manifest_url);
        self.variants = variants;
        self.storage_backend = Some(backend);
        Ok(())
    }

    pub fn fail(&mut self, stage: ProgressStage, error: impl Into<String>) -> Result<(), AppError> {
        self.transition(VideoStatus::Failed)?;
        self.error = Some(error.into());
        self.failed_stage = Some(stage);
        Ok(())
    }
}
