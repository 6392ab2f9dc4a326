//! vidstream storage library
//!
//! The `Storage` backend trait with S3-compatible and local filesystem
//! implementations, and the `StorageGateway` that publishes a rendered asset
//! directory to the primary backend with automatic fallback to local storage.
//!
//! # Storage key format
//!
//! All backends share one key layout, generated in the `keys` module:
//!
//! - `videos/{video_id}/master.m3u8`
//! - `videos/{video_id}/{height}p/playlist.m3u8`
//! - `videos/{video_id}/{height}p/segment_{n}.ts`
//!
//! Keys must not contain `..` or a leading `/`.

pub mod content_type;
pub mod factory;
pub mod gateway;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use content_type::content_type_for;
pub use factory::create_gateway;
pub use gateway::{CurrentFile, StorageGateway, UploadObserver, UploadOutcome, UploadProgress};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
pub use vidstream_core::StorageBackend;
