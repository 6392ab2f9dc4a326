use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let pipeline = &state.pipeline;
    Json(json!({
        "status": "ok",
        "activeUploads": pipeline.receiver().active_sessions().await,
        "remoteStorage": pipeline.gateway().has_primary(),
    }))
}
