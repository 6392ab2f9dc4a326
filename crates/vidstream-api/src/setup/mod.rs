//! Application setup and initialization
//!
//! Builds the pipeline from configuration, starts the upload session reaper and
//! assembles the router.

pub mod reaper;
pub mod routes;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use vidstream_core::Config;
use vidstream_db::InMemoryVideoRepository;
use vidstream_processing::VideoPipeline;

use crate::state::AppState;

/// Initialize the entire application
pub async fn initialize_app(config: &Config) -> Result<(Arc<AppState>, axum::Router)> {
    tracing::info!(
        environment = %config.server.environment,
        "Configuration loaded"
    );

    let repository = Arc::new(InMemoryVideoRepository::new());
    let pipeline = VideoPipeline::from_config(config, repository)
        .await
        .context("Failed to build video pipeline")?;
    let pipeline = Arc::new(pipeline);

    reaper::spawn_session_reaper(Arc::clone(&pipeline), config.upload.reap_interval);

    let state = Arc::new(AppState::new(pipeline, config.server.max_fragment_bytes));
    let router = routes::build_router(Arc::clone(&state), &config.storage.local);

    Ok((state, router))
}
