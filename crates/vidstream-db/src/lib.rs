//! Metadata record store for video assets.
//!
//! The pipeline only needs a keyed record store: create a record at upload
//! initiation, move it through its lifecycle, and read it back. `VideoRepository`
//! is that seam; `InMemoryVideoRepository` is the implementation the service runs
//! with.

pub mod video;

pub use video::{InMemoryVideoRepository, VideoRepository};
