//! Server-sent-event progress stream for one asset.
//!
//! Live events are at-most-once: nothing published before the client connected
//! is replayed. An asset that already settled gets a single synthesized terminal
//! event built from its record, then the stream ends.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
};
use futures::stream::{self, BoxStream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use vidstream_core::models::{ProgressEvent, ProgressStage, VideoAsset, VideoStatus};
use vidstream_core::AppError;
use vidstream_db::VideoRepository;

use super::parse_video_id;
use crate::constants::SSE_KEEP_ALIVE_SECS;
use crate::error::HttpAppError;
use crate::state::AppState;

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

pub async fn progress_stream(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Sse<KeepAliveStream<EventStream>>, HttpAppError> {
    let video_id = parse_video_id(&video_id)?;

    // Subscribe before reading the record so a terminal event cannot slip between.
    let progress = state.pipeline.progress();
    let receiver = progress.subscribe(&video_id);
    let video = match state.pipeline.repository().get(&video_id).await {
        Ok(Some(video)) => video,
        Ok(None) => {
            progress.unsubscribe(&video_id, receiver);
            return Err(AppError::NotFound(format!("Video not found: {}", video_id)).into());
        }
        Err(e) => {
            progress.unsubscribe(&video_id, receiver);
            return Err(e.into());
        }
    };

    let events: EventStream = match settled_event(&video) {
        Some(event) => {
            progress.unsubscribe(&video_id, receiver);
            stream::iter(to_sse(&event).map(Ok)).boxed()
        }
        None => BroadcastStream::new(receiver)
            .filter_map(|item| async move {
                match item {
                    Ok(event) => to_sse(&event).map(Ok),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Progress subscriber lagged");
                        None
                    }
                }
            })
            .boxed(),
    };

    tracing::debug!(video_id = %video_id, status = %video.status, "Progress stream opened");
    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS))
            .text("keep-alive"),
    ))
}

/// Terminal event equivalent to what a live subscriber would have seen last.
fn settled_event(video: &VideoAsset) -> Option<ProgressEvent> {
    match video.status {
        VideoStatus::Completed => Some(ProgressEvent::completed(
            video.id.clone(),
            ProgressStage::Upload,
            Some(serde_json::json!({
                "masterPlaylistUrl": video.manifest_url,
                "backend": video.storage_backend,
                "variants": video.variants,
            })),
        )),
        VideoStatus::Failed => Some(ProgressEvent::error(
            video.id.clone(),
            video.failed_stage.unwrap_or(ProgressStage::Transcoding),
            video.error.clone().unwrap_or_default(),
        )),
        VideoStatus::Uploading | VideoStatus::Processing => None,
    }
}

fn to_sse(event: &ProgressEvent) -> Option<Event> {
    match Event::default().event("progress").json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode progress event");
            None
        }
    }
}
