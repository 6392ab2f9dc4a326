use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::VideoId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Analysis,
    Transcoding,
    Playlist,
    Upload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Started,
    Processing,
    Completed,
    Error,
}

/// A single progress notification for one asset, as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    #[serde(rename = "videoId")]
    pub video_id: VideoId,
    pub stage: ProgressStage,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    fn new(video_id: VideoId, stage: ProgressStage, status: ProgressStatus) -> Self {
        Self {
            video_id,
            stage,
            status,
            percent: None,
            payload: None,
            error: None,
        }
    }

    pub fn started(video_id: VideoId, stage: ProgressStage) -> Self {
        Self::new(video_id, stage, ProgressStatus::Started)
    }

    pub fn percent(video_id: VideoId, stage: ProgressStage, percent: u8) -> Self {
        Self {
            percent: Some(percent.min(100)),
            ..Self::new(video_id, stage, ProgressStatus::Processing)
        }
    }

    pub fn payload(video_id: VideoId, stage: ProgressStage, payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::new(video_id, stage, ProgressStatus::Processing)
        }
    }

    pub fn completed(video_id: VideoId, stage: ProgressStage, payload: Option<Value>) -> Self {
        Self {
            percent: Some(100),
            payload,
            ..Self::new(video_id, stage, ProgressStatus::Completed)
        }
    }

    pub fn error(video_id: VideoId, stage: ProgressStage, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(video_id, stage, ProgressStatus::Error)
        }
    }

    /// Whether this event ends the asset's run: any error, or the final upload
    /// completion. Per-stage `completed` events are not terminal.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            ProgressStatus::Error => true,
            ProgressStatus::Completed => self.stage == ProgressStage::Upload,
            _ => false,
        }
    }
}
