//! Asset lookup handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use vidstream_core::AppError;
use vidstream_db::VideoRepository;

use super::{parse_video_id, Owner};
use crate::error::HttpAppError;
use crate::state::AppState;

pub async fn get_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let video_id = parse_video_id(&video_id)?;
    let video = state
        .pipeline
        .repository()
        .get(&video_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Video not found: {}", video_id)))?;
    Ok(Json(video))
}

/// The caller's videos, newest first.
pub async fn list_videos(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
) -> Result<impl IntoResponse, HttpAppError> {
    let videos = state.pipeline.repository().list_by_owner(&owner).await?;
    Ok(Json(videos))
}
