//! Route configuration and setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use vidstream_core::LocalStorageConfig;

use crate::constants::{API_PREFIX, MULTIPART_OVERHEAD_BYTES};
use crate::handlers::{health, progress, upload, video};
use crate::state::AppState;

/// Setup all application routes
///
/// When the local backend publishes under a path on this host, its storage root
/// is served at that path so local manifests are playable.
pub fn build_router(state: Arc<AppState>, local: &LocalStorageConfig) -> Router {
    let chunk_limit = state.max_fragment_bytes + MULTIPART_OVERHEAD_BYTES;

    let api = Router::new()
        .route("/uploads/init", post(upload::init_upload))
        .route(
            "/uploads/chunk",
            post(upload::upload_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/uploads/{video_id}/complete", post(upload::complete_upload))
        .route("/uploads/{video_id}", delete(upload::abort_upload))
        .route("/videos", get(video::list_videos))
        .route("/videos/{video_id}", get(video::get_video))
        .route("/videos/{video_id}/progress", get(progress::progress_stream));

    let mut app = Router::new()
        .route("/health", get(health::health))
        .nest(API_PREFIX, api);

    if let Some(mount) = local_mount_path(&local.base_url) {
        tracing::info!(mount = %mount, root = %local.path.display(), "Serving local storage");
        app = app.nest_service(&mount, ServeDir::new(&local.path));
    }

    app.layer(setup_cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn setup_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

/// Path prefix for a same-host local base URL; absolute URLs are served elsewhere.
fn local_mount_path(base_url: &str) -> Option<String> {
    let trimmed = base_url.trim_end_matches('/');
    (trimmed.starts_with('/') && trimmed.len() > 1).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_mount_path() {
        assert_eq!(local_mount_path("/uploads"), Some("/uploads".to_string()));
        assert_eq!(local_mount_path("/media/"), Some("/media".to_string()));
        assert_eq!(local_mount_path("/"), None);
        assert_eq!(local_mount_path("https://cdn.example.com"), None);
    }
}
