//! vidstream processing library
//!
//! The ingest-to-publish core: fragmented upload reassembly, variant planning,
//! transcode orchestration over an external encoder, master playlist rendering,
//! per-asset progress broadcasting, and the `VideoPipeline` wiring them to the
//! storage gateway and the metadata store.

pub mod pipeline;
pub mod playlist;
pub mod progress;
pub mod upload;
pub mod video;

pub use pipeline::VideoPipeline;
pub use playlist::PlaylistBuilder;
pub use progress::{ProgressBroadcaster, ProgressHandle};
pub use upload::{AssembledUpload, ChunkReceiver, FragmentOutcome, UploadHint};
pub use video::{
    EncodeJob, Encoder, EncoderProfile, FfmpegEncoder, FfprobeProbe, HardwareAcceleration,
    ProgressAggregator, ProgressSink, SourceProbe, TranscodeOrchestrator, TranscodeOutput,
    VariantPlanner, VariantSpec,
};
