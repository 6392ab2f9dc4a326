//! Error types module
//!
//! The pipeline's failure taxonomy. Upload errors are recoverable per session and
//! never affect other sessions; analysis, transcode and storage errors are fatal to
//! the asset they occur on. `AppError` unifies them for the transport layer, which
//! renders them through [`ErrorMetadata`].

use std::io;

use crate::models::{ProgressStage, VideoId, VideoStatus};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "INCOMPLETE_UPLOAD")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Errors raised while receiving and reassembling a fragmented upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload session already active: {0}")]
    DuplicateSession(VideoId),

    #[error("No active upload session: {0}")]
    UnknownSession(VideoId),

    #[error("Upload {video_id} is incomplete: expected {expected} bytes, received {received}")]
    IncompleteUpload {
        video_id: VideoId,
        expected: u64,
        received: u64,
    },

    #[error("Fragment at offset {offset} rejected for {video_id}: {reason}")]
    FragmentRejected {
        video_id: VideoId,
        offset: u64,
        reason: String,
    },

    #[error("Invalid upload size: {0}")]
    InvalidSize(String),

    #[error("Upload storage error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Source analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Transcode failed for {height}p variant: {message}")]
    TranscodeFailed { height: u32, message: String },

    #[error("Playlist generation failed: {0}")]
    PlaylistFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStateTransition { from: VideoStatus, to: VideoStatus },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, log_level).
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        AppError::Upload(upload) => match upload {
            UploadError::DuplicateSession(_) => {
                (409, "DUPLICATE_SESSION", false, LogLevel::Debug)
            }
            UploadError::UnknownSession(_) => (404, "UNKNOWN_SESSION", false, LogLevel::Debug),
            UploadError::IncompleteUpload { .. } => {
                (422, "INCOMPLETE_UPLOAD", false, LogLevel::Warn)
            }
            UploadError::FragmentRejected { .. } => {
                (400, "FRAGMENT_REJECTED", true, LogLevel::Debug)
            }
            UploadError::InvalidSize(_) => (400, "INVALID_SIZE", false, LogLevel::Debug),
            UploadError::Io(_) => (500, "UPLOAD_IO_ERROR", true, LogLevel::Error),
        },
        AppError::AnalysisFailed(_) => (422, "ANALYSIS_FAILED", false, LogLevel::Warn),
        AppError::TranscodeFailed { .. } => (500, "TRANSCODE_FAILED", false, LogLevel::Error),
        AppError::PlaylistFailed(_) => (500, "PLAYLIST_FAILED", false, LogLevel::Error),
        AppError::Storage(_) => (502, "STORAGE_ERROR", true, LogLevel::Error),
        AppError::Configuration(_) => (500, "CONFIGURATION_ERROR", false, LogLevel::Error),
        AppError::InvalidStateTransition { .. } => {
            (409, "INVALID_STATE_TRANSITION", false, LogLevel::Warn)
        }
        AppError::InvalidInput(_) => (400, "INVALID_INPUT", false, LogLevel::Debug),
        AppError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        AppError::PayloadTooLarge(_) => (413, "PAYLOAD_TOO_LARGE", false, LogLevel::Debug),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            (500, "INTERNAL_ERROR", true, LogLevel::Error)
        }
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Upload(_) => "Upload",
            AppError::AnalysisFailed(_) => "AnalysisFailed",
            AppError::TranscodeFailed { .. } => "TranscodeFailed",
            AppError::PlaylistFailed(_) => "PlaylistFailed",
            AppError::Storage(_) => "Storage",
            AppError::Configuration(_) => "Configuration",
            AppError::InvalidStateTransition { .. } => "InvalidStateTransition",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// The pipeline stage a fatal asset error is reported against.
    pub fn failed_stage(&self) -> ProgressStage {
        match self {
            AppError::AnalysisFailed(_) => ProgressStage::Analysis,
            AppError::TranscodeFailed { .. } => ProgressStage::Transcoding,
            AppError::PlaylistFailed(_) => ProgressStage::Playlist,
            AppError::Storage(_) => ProgressStage::Upload,
            _ => ProgressStage::Transcoding,
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Upload(UploadError::Io(_)) => "Failed to store upload fragment".to_string(),
            AppError::Upload(other) => other.to_string(),
            AppError::AnalysisFailed(_) => {
                "The uploaded file could not be analysed as a video".to_string()
            }
            AppError::TranscodeFailed { height, .. } => {
                format!("Transcoding failed for the {}p variant", height)
            }
            AppError::PlaylistFailed(_) => "Failed to generate playlist".to_string(),
            AppError::Storage(_) => "Failed to publish video to storage".to_string(),
            AppError::Configuration(_) => "Service is misconfigured".to_string(),
            AppError::InvalidStateTransition { from, to } => {
                format!("Video cannot move from {} to {}", from, to)
            }
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}
