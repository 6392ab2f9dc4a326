//! Video transcoding: source analysis, variant planning, encoding and the
//! orchestration that ties them together.

pub mod encoder;
pub mod orchestration;
pub mod planner;
pub mod probe;

pub use encoder::{EncodeJob, Encoder, FfmpegEncoder, ProgressSink};
pub use orchestration::{ProgressAggregator, TranscodeOrchestrator, TranscodeOutput};
pub use planner::{EncoderProfile, HardwareAcceleration, VariantPlanner, VariantSpec};
pub use probe::{FfprobeProbe, SourceProbe};
