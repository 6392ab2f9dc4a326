//! Fragmented upload handlers.
//!
//! `init` opens a session for a client-chosen video id, `chunk` accepts one
//! fragment as multipart (`chunk`, `start`, `videoId`, `total`), `complete` lets
//! the client declare it is done, and `DELETE` abandons the upload.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use vidstream_core::models::InitUploadRequest;
use vidstream_core::{AppError, VideoId};

use super::{parse_video_id, Owner};
use crate::error::HttpAppError;
use crate::state::AppState;

pub async fn init_upload(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    payload: Result<Json<InitUploadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Json(request) = payload?;
    if request.filename.trim().is_empty() {
        return Err(AppError::InvalidInput("filename must not be empty".to_string()).into());
    }

    let video = state.pipeline.init_upload(request, owner).await?;
    tracing::info!(video_id = %video.id, owner = %video.owner, "Upload initialized");
    Ok((StatusCode::CREATED, Json(video)))
}

#[derive(Default)]
struct ChunkForm {
    chunk: Option<axum::body::Bytes>,
    start: Option<u64>,
    total: Option<u64>,
    video_id: Option<VideoId>,
}

fn parse_u64_field(name: &str, raw: &str) -> Result<u64, HttpAppError> {
    raw.trim().parse::<u64>().map_err(|_| {
        HttpAppError(AppError::InvalidInput(format!(
            "Field '{}' must be a non-negative integer",
            name
        )))
    })
}

async fn read_chunk_form(
    multipart: &mut Multipart,
    max_fragment_bytes: usize,
) -> Result<ChunkForm, HttpAppError> {
    let mut form = ChunkForm::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string).unwrap_or_default();
        match field_name.as_str() {
            "chunk" => {
                if form.chunk.is_some() {
                    return Err(AppError::InvalidInput(
                        "Multiple chunk fields are not allowed".to_string(),
                    )
                    .into());
                }
                let data = field.bytes().await?;
                if data.len() > max_fragment_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "{} bytes exceeds max fragment size {} bytes",
                        data.len(),
                        max_fragment_bytes
                    ))
                    .into());
                }
                form.chunk = Some(data);
            }
            "start" => form.start = Some(parse_u64_field("start", &field.text().await?)?),
            "total" => form.total = Some(parse_u64_field("total", &field.text().await?)?),
            "videoId" => form.video_id = Some(parse_video_id(&field.text().await?)?),
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(form)
}

pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let form = read_chunk_form(&mut multipart, state.max_fragment_bytes).await?;

    let missing = |field: &str| HttpAppError(AppError::InvalidInput(format!("Missing field '{}'", field)));
    let video_id = form.video_id.ok_or_else(|| missing("videoId"))?;
    let start = form.start.ok_or_else(|| missing("start"))?;
    let chunk = form.chunk.ok_or_else(|| missing("chunk"))?;

    let response = state
        .pipeline
        .receive_chunk(&video_id, start, form.total, &chunk)
        .await?;
    Ok(Json(response))
}

pub async fn complete_upload(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let video_id = parse_video_id(&video_id)?;
    let response = state.pipeline.finish_upload(&video_id).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn abort_upload(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let video_id = parse_video_id(&video_id)?;
    state.pipeline.abort_upload(&video_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
