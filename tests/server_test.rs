mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use camfeed::processor::FrameProcessor;
use camfeed::{server, RegistryConfig};
use common::{service_with, Behavior, RecordingProcessor, ScriptedFactory};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app(config: RegistryConfig, behavior: Behavior, dir: &std::path::Path) -> Router {
    let factory = Arc::new(ScriptedFactory::new(behavior));
    server::router(Arc::new(service_with(config, factory, None, dir)))
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn lists_catalog_cameras() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(RegistryConfig::simulated(), Behavior::Endless, dir.path());

    let (status, body) = call(&app, "GET", "/cameras").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cameras"], serde_json::json!([0, 1, 2, 3, 4, 5, 6]));
}

#[tokio::test]
async fn releasing_unknown_camera_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(RegistryConfig::exclusive(), Behavior::Endless, dir.path());

    let (status, body) = call(&app, "POST", "/release_camera/999").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "released");
    assert_eq!(body["camera_id"], 999);
}

#[tokio::test]
async fn snapshot_create_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(RegistryConfig::exclusive(), Behavior::Endless, dir.path());

    let (status, body) = call(&app, "POST", "/cameras/0/snapshot").await;
    assert_eq!(status, StatusCode::CREATED);
    let artifact = body["artifact_id"].as_str().unwrap().to_string();
    assert!(dir.path().join(&artifact).is_file());

    let (status, body) = call(&app, "GET", "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "exclusive");
    assert_eq!(body["open_cameras"], serde_json::json!([0]));
    assert_eq!(
        body["devices"],
        serde_json::json!([{ "camera_id": 0, "device_index": 0, "width": 8, "height": 8 }])
    );

    let uri = format!("/snapshots/{artifact}");
    let (status, body) = call(&app, "DELETE", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "deleted");

    let (status, body) = call(&app, "DELETE", &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn snapshot_read_failure_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(RegistryConfig::exclusive(), Behavior::FailReads, dir.path());

    let (status, body) = call(&app, "POST", "/cameras/1/snapshot").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "READ_FAILURE");
}

#[tokio::test]
async fn video_feed_on_missing_device_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(RegistryConfig::exclusive(), Behavior::FailOpen, dir.path());

    let (status, body) = call(&app, "GET", "/video_feed/3").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "DEVICE_OPEN_ERROR");
}

#[tokio::test]
async fn video_feed_streams_multipart_until_device_runs_dry() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(RegistryConfig::exclusive(), Behavior::Frames(2), dir.path());

    let request = Request::builder()
        .uri("/video_feed/0")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let marker = b"--frame\r\n";
    let parts = body.windows(marker.len()).filter(|w| *w == &marker[..]).count();
    assert_eq!(parts, 2);

    // The camera stays registered after the stream ends
    let (_, status) = call(&app, "GET", "/status").await;
    assert_eq!(status["open_cameras"], serde_json::json!([0]));
}

#[tokio::test]
async fn disconnecting_viewer_stops_reads_and_keeps_camera() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(
        ScriptedFactory::new(Behavior::Endless).with_read_delay(Duration::from_millis(150)),
    );
    let recorder = Arc::new(RecordingProcessor::default());
    let processor: Arc<dyn FrameProcessor> = recorder.clone();
    let service = service_with(RegistryConfig::exclusive(), factory.clone(), Some(processor), dir.path());
    let app = server::router(Arc::new(service));

    let request = Request::builder()
        .uri("/video_feed/4")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let mut body = response.into_body().into_data_stream();

    let first = body.next().await.unwrap().unwrap();
    assert!(first.starts_with(b"--frame\r\n"));

    // Start the next read, then hang up while the device is still busy
    assert!(tokio::time::timeout(Duration::from_millis(30), body.next())
        .await
        .is_err());
    drop(body);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let reads = factory.counters.reads();
    assert_eq!(reads, 2);
    // The frame read after the hang-up is dropped before processing
    assert_eq!(recorder.applied(), vec![4]);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(factory.counters.reads(), reads);

    let (_, status) = call(&app, "GET", "/status").await;
    assert_eq!(status["open_cameras"], serde_json::json!([4]));
    assert_eq!(factory.counters.closes(), 0);
}
