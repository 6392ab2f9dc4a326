pub mod id;
pub mod progress;
pub mod upload;
pub mod video;

pub use id::VideoId;
pub use progress::{ProgressEvent, ProgressStage, ProgressStatus};
pub use upload::{ChunkUploadResponse, InitUploadRequest, UploadSession};
pub use video::{SourceMetadata, Variant, VideoAsset, VideoStatus};
