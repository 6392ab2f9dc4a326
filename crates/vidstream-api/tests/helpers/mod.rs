//! Test helpers: build a pipeline with a scripted probe and encoder, local
//! storage in a temp dir, and the full router behind a `TestServer`.
//!
//! Run from workspace root: `cargo test -p vidstream-api`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use tempfile::TempDir;
use vidstream_api::constants;
use vidstream_api::setup::routes;
use vidstream_api::AppState;
use vidstream_core::models::SourceMetadata;
use vidstream_core::{BitrateLadder, EncodingConfig, LocalStorageConfig};
use vidstream_db::InMemoryVideoRepository;
use vidstream_processing::{
    ChunkReceiver, EncodeJob, Encoder, EncoderProfile, HardwareAcceleration, ProgressBroadcaster,
    ProgressSink, SourceProbe, TranscodeOrchestrator, VariantPlanner, VideoPipeline,
};
use vidstream_storage::{LocalStorage, Storage, StorageGateway};

pub const MAX_FRAGMENT_BYTES: usize = 4096;

/// API path prefix for tests (e.g. `/api/v1`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Reports a 480p source, or fails on bytes starting with `garbage`.
struct FakeProbe;

#[async_trait]
impl SourceProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> anyhow::Result<SourceMetadata> {
        let bytes = tokio::fs::read(path).await?;
        if bytes.starts_with(b"garbage") {
            return Err(anyhow!("moov atom not found"));
        }
        Ok(SourceMetadata {
            duration: 4.0,
            width: 854,
            height: 480,
            codec: "h264".to_string(),
            bitrate: None,
            framerate: Some(25.0),
        })
    }
}

struct FakeEncoder;

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(&self, job: &EncodeJob, progress: &dyn ProgressSink) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&job.output_dir).await?;
        progress.report(50.0);
        tokio::fs::write(job.output_dir.join("segment_0.ts"), b"ts").await?;
        tokio::fs::write(job.playlist_path(), "#EXTM3U\n#EXT-X-ENDLIST\n").await?;
        Ok(())
    }
}

/// Test application: server and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub async fn setup_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let public = temp_dir.path().join("public");

    let local = LocalStorageConfig {
        path: public.clone(),
        base_url: "/media".to_string(),
    };
    let fallback: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(public, local.base_url.clone())
            .await
            .expect("Failed to create local storage"),
    );

    let orchestrator = TranscodeOrchestrator::new(
        Arc::new(FakeProbe),
        Arc::new(FakeEncoder),
        VariantPlanner::new(
            vec![720, 480, 360],
            BitrateLadder::default(),
            EncoderProfile::for_acceleration(
                HardwareAcceleration::Software,
                &EncodingConfig::default(),
            ),
        ),
        4,
    );

    let pipeline = Arc::new(VideoPipeline::new(
        ChunkReceiver::new(
            temp_dir.path().join("fragments"),
            temp_dir.path().join("assembled"),
            Duration::from_secs(60),
        ),
        orchestrator,
        StorageGateway::new(None, fallback, 2),
        Arc::new(InMemoryVideoRepository::new()),
        Arc::new(ProgressBroadcaster::new(256)),
        temp_dir.path().join("work"),
    ));

    let state = Arc::new(AppState::new(pipeline, MAX_FRAGMENT_BYTES));
    let app = routes::build_router(Arc::clone(&state), &local);
    let server = TestServer::new(app).expect("Failed to create test server");

    TestApp {
        server,
        state,
        _temp_dir: temp_dir,
    }
}

pub fn chunk_form(video_id: &str, start: usize, total: usize, data: &[u8]) -> MultipartForm {
    MultipartForm::new()
        .add_text("videoId", video_id)
        .add_text("start", start)
        .add_text("total", total)
        .add_part(
            "chunk",
            Part::bytes(data.to_vec())
                .file_name("blob")
                .mime_type("application/octet-stream"),
        )
}

pub async fn init_upload(client: &TestServer, video_id: &str, size: usize) {
    let response = client
        .post(&api_path("/uploads/init"))
        .add_header("x-user-id", "alice")
        .json(&serde_json::json!({
            "filename": "clip.mp4",
            "size": size,
            "videoId": video_id,
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
}

/// Init, then send `data` in `chunk_size` fragments.
pub async fn upload_video(client: &TestServer, video_id: &str, data: &[u8], chunk_size: usize) {
    init_upload(client, video_id, data.len()).await;
    for (index, chunk) in data.chunks(chunk_size).enumerate() {
        client
            .post(&api_path("/uploads/chunk"))
            .multipart(chunk_form(video_id, index * chunk_size, data.len(), chunk))
            .await
            .assert_status_ok();
    }
}

/// Poll the asset until it reaches `completed` or `failed`.
pub async fn wait_for_settled(client: &TestServer, video_id: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let video: serde_json::Value = client
                .get(&api_path(&format!("/videos/{}", video_id)))
                .await
                .json();
            if video["status"] == "completed" || video["status"] == "failed" {
                return video;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("video did not settle")
}
