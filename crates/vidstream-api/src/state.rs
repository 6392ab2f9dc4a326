//! Application state shared by every handler.

use std::sync::Arc;

use vidstream_processing::VideoPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<VideoPipeline>,
    /// Largest fragment accepted by the chunk endpoint.
    pub max_fragment_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<VideoPipeline>, max_fragment_bytes: usize) -> Self {
        Self {
            pipeline,
            max_fragment_bytes,
        }
    }
}
