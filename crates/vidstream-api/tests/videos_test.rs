//! Asset lookup, progress stream and health integration tests.
//!
//! Run with: `cargo test -p vidstream-api --test videos_test`

mod helpers;

use axum::http::StatusCode;
use helpers::{api_path, init_upload, setup_test_app, upload_video, wait_for_settled};

#[tokio::test]
async fn test_get_unknown_video() {
    let app = setup_test_app().await;

    let response = app.client().get(&api_path("/videos/video_missing")).await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_new_upload_is_uploading() {
    let app = setup_test_app().await;
    let client = app.client();
    init_upload(client, "video_fresh", 1000).await;

    let video: serde_json::Value = client.get(&api_path("/videos/video_fresh")).await.json();

    assert_eq!(video["status"], "uploading");
    assert_eq!(video["progress"], 0);
    assert_eq!(video["variants"], serde_json::json!([]));
}

#[tokio::test]
async fn test_list_videos_by_owner() {
    let app = setup_test_app().await;
    let client = app.client();
    init_upload(client, "video_one", 10).await;
    init_upload(client, "video_two", 10).await;

    let mine: Vec<serde_json::Value> = client
        .get(&api_path("/videos"))
        .add_header("x-user-id", "alice")
        .await
        .json();
    let theirs: Vec<serde_json::Value> = client
        .get(&api_path("/videos"))
        .add_header("x-user-id", "bob")
        .await
        .json();

    assert_eq!(mine.len(), 2);
    assert!(theirs.is_empty());
}

#[tokio::test]
async fn test_progress_stream_for_completed_video() {
    let app = setup_test_app().await;
    let client = app.client();
    upload_video(client, "video_sse", &[5u8; 512], 512).await;
    wait_for_settled(client, "video_sse").await;

    let response = client
        .get(&api_path("/videos/video_sse/progress"))
        .await;

    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("event: progress"));
    assert!(body.contains(r#""status":"completed""#));
    assert!(body.contains(r#""stage":"upload""#));
    assert!(body.contains("/media/videos/video_sse/master.m3u8"));
    assert_eq!(app.state.pipeline.progress().channel_count(), 0);
}

#[tokio::test]
async fn test_progress_stream_for_failed_video() {
    let app = setup_test_app().await;
    let client = app.client();
    upload_video(client, "video_sse_bad", b"garbage", 7).await;
    wait_for_settled(client, "video_sse_bad").await;

    let body = client
        .get(&api_path("/videos/video_sse_bad/progress"))
        .await
        .text();

    assert!(body.contains(r#""status":"error""#));
    assert!(body.contains(r#""stage":"analysis""#));
    assert!(body.contains("Source analysis failed"));
    assert_eq!(app.state.pipeline.progress().channel_count(), 0);
}

#[tokio::test]
async fn test_progress_stream_unknown_video() {
    let app = setup_test_app().await;

    for _ in 0..3 {
        app.client()
            .get(&api_path("/videos/video_nobody/progress"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
    assert_eq!(app.state.pipeline.progress().channel_count(), 0);
}

#[tokio::test]
async fn test_health() {
    let app = setup_test_app().await;
    let client = app.client();
    init_upload(client, "video_active", 10).await;

    let body: serde_json::Value = client.get("/health").await.json();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeUploads"], 1);
    assert_eq!(body["remoteStorage"], false);
}
