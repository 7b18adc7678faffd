//! HTTP control plane driven in-process with tower
//!
//! Run with: cargo test --test http_routes --features server

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use crabrecord::server::router;
use crabrecord::testing::{MemorySinkBackend, SyntheticBackend};
use crabrecord::{CaptureFormat, QueueMode, RecorderSettings, RecordingStore, SessionRegistry};
use serde_json::Value;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const BOUNDARY: &str = "crabrecord-test-boundary";

fn app(sources: SyntheticBackend) -> (Router, Arc<SessionRegistry>, TempDir) {
    app_with_sinks(sources, MemorySinkBackend::new())
}

fn app_with_sinks(
    sources: SyntheticBackend,
    sinks: MemorySinkBackend,
) -> (Router, Arc<SessionRegistry>, TempDir) {
    let dir = tempdir().unwrap();
    let registry = Arc::new(SessionRegistry::new(
        RecorderSettings {
            device_index: 0,
            requested: CaptureFormat::new(8, 8, 30.0),
            queue: QueueMode::Unbounded,
        },
        RecordingStore::open(dir.path()).unwrap(),
        Arc::new(sources),
        Arc::new(sinks),
    ));
    (router(registry.clone(), 1024 * 1024), registry, dir)
}

fn pacing_camera() -> SyntheticBackend {
    SyntheticBackend::new().with_read_delay(Duration::from_millis(2))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn multipart(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: video/mp4\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_cors_check() {
    let (app, _registry, _dir) = app(SyntheticBackend::new());
    let (status, body) = send_json(&app, get("/test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "CORS is working!");
}

#[tokio::test]
async fn test_start_status_stop() {
    let (app, _registry, _dir) = app(pacing_camera());

    let (status, body) = send_json(&app, post("/record/start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Recording started");
    let filename = body["filename"].as_str().unwrap().to_string();
    assert!(filename.ends_with(".mp4"));

    let (status, body) = send_json(&app, get("/record/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "recording");
    assert_eq!(body["active"]["filename"], filename.as_str());

    tokio::time::sleep(Duration::from_millis(20)).await;

    let (status, body) = send_json(&app, post("/record/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Recording stopped");
    assert_eq!(body["summary"]["filename"], filename.as_str());
    assert_eq!(
        body["summary"]["frames_written"],
        body["summary"]["frames_captured"]
    );

    let (_, body) = send_json(&app, get("/record/status")).await;
    assert_eq!(body["state"], "idle");
    assert_eq!(body["last"]["filename"], filename.as_str());
}

#[tokio::test]
async fn test_second_start_conflicts() {
    let (app, _registry, _dir) = app(pacing_camera());

    let (status, _) = send_json(&app, post("/record/start")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&app, post("/record/start")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already active"));

    let (status, _) = send_json(&app, post("/record/stop")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_stop_when_idle_succeeds() {
    let (app, _registry, _dir) = app(SyntheticBackend::new());
    let (status, body) = send_json(&app, post("/record/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["summary"].is_null());
}

#[tokio::test]
async fn test_start_without_camera_is_server_error() {
    let (app, _registry, _dir) = app(SyntheticBackend::new().failing_open("no device"));
    let (status, body) = send_json(&app, post("/record/start")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Device error"));
}

#[tokio::test]
async fn test_stop_after_write_failure_is_server_error() {
    let (app, _registry, _dir) = app_with_sinks(
        SyntheticBackend::new(),
        MemorySinkBackend::new().failing_after(2),
    );

    let (status, _) = send_json(&app, post("/record/start")).await;
    assert_eq!(status, StatusCode::OK);

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let (_, body) = send_json(&app, get("/record/status")).await;
        if body["state"] == "stopped" {
            assert!(body["active"]["failure"].is_string());
            break;
        }
        assert!(std::time::Instant::now() < deadline, "session never failed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (status, body) = send_json(&app, post("/record/stop")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Encode error"));

    let (status, body) = send_json(&app, post("/record/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["summary"].is_null());
}

#[tokio::test]
async fn test_upload_then_download() {
    let (app, _registry, dir) = app(SyntheticBackend::new());

    let (status, body) = send_json(&app, multipart("video", "clip.mp4", b"not really mp4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "clip.mp4");
    assert!(dir.path().join("clip.mp4").exists());

    let response = app.clone().oneshot(get("/video/clip.mp4")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"not really mp4");
}

#[tokio::test]
async fn test_upload_without_video_field() {
    let (app, _registry, _dir) = app(SyntheticBackend::new());
    let (status, body) = send_json(&app, multipart("document", "notes.txt", b"hello")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No video file uploaded");
}

#[tokio::test]
async fn test_upload_with_unsafe_name() {
    let (app, _registry, _dir) = app(SyntheticBackend::new());
    let (status, _) = send_json(&app, multipart("video", ".hidden.mp4", b"x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_video_is_not_found() {
    let (app, _registry, _dir) = app(SyntheticBackend::new());
    let (status, body) = send_json(&app, get("/video/nothing.mp4")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Video not found");
}

#[tokio::test]
async fn test_recording_is_downloadable() {
    let (app, registry, _dir) = app(SyntheticBackend::new().with_frame_limit(3));

    let (_, body) = send_json(&app, post("/record/start")).await;
    let filename = body["filename"].as_str().unwrap().to_string();
    let (status, _) = send_json(&app, post("/record/stop")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get(&format!("/video/{}", filename))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, registry.fetch(&filename).unwrap().to_vec());
}
