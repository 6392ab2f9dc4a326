//! vidstream core library
//!
//! Domain models, the error taxonomy, and configuration shared by every vidstream
//! crate: the upload receiver, the transcode pipeline, the storage gateway and the
//! HTTP transport.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    BitrateLadder, BitrateTier, Config, EncodingConfig, HardwareAccelMode, LocalStorageConfig,
    ProgressConfig, RemoteStorageConfig, ServerConfig, StorageConfig, UploadConfig, VideoConfig,
};
pub use error::{AppError, ErrorMetadata, LogLevel, UploadError};
pub use models::VideoId;
pub use storage_types::StorageBackend;
