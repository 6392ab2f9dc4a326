use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VideoId;

/// Snapshot of an active fragmented upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSession {
    pub video_id: VideoId,
    pub filename: String,
    pub title: String,
    pub owner: String,
    /// Size the client declared at init time, in bytes.
    pub declared_size: u64,
    /// Bytes received across distinct fragment offsets.
    pub received_bytes: u64,
    /// Per-session directory holding one file per fragment offset.
    pub fragment_dir: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn progress_percent(&self) -> f64 {
        if self.declared_size == 0 {
            return 0.0;
        }
        (self.received_bytes as f64 / self.declared_size as f64 * 100.0).min(100.0)
    }

    pub fn is_complete(&self) -> bool {
        self.received_bytes >= self.declared_size
    }
}

/// Body of the upload init call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
    pub size: u64,
    pub video_id: VideoId,
}

impl InitUploadRequest {
    /// Title to record for the asset: the explicit title, or the filename without
    /// its extension.
    pub fn resolved_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => title_from_filename(&self.filename),
        }
    }
}

/// Response to every accepted fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkUploadResponse {
    pub received: u64,
    pub total: u64,
}

fn title_from_filename(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => filename.to_string(),
    }
}
