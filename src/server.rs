//! HTTP host for the camera service.
//!
//! Every call into the service can block on a device, so handlers run it on
//! the blocking pool. Stream bodies pull one frame per poll.

use crate::error::Error;
use crate::service::CameraService;
use crate::stream::{self, CancelToken, FrameStream};
use crate::CameraId;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

type AppState = Arc<CameraService>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::DeviceOpen { .. } | Error::ReadFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Processor(crate::error::ProcessorError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Processor(_) | Error::Persistence(_) | Error::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.code(), self.to_string())
    }
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (status, Json(json!({ "error": code, "message": message }))).into_response()
}

/// Run blocking service work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        tracing::error!(error = %e, "Blocking task failed");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            e.to_string(),
        )
    })
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/cameras", get(list_cameras))
        .route("/cameras/{camera_id}/snapshot", post(capture_snapshot))
        .route("/snapshots/{artifact_id}", delete(delete_snapshot))
        .route("/video_feed/{camera_id}", get(video_feed))
        .route("/release_camera/{camera_id}", post(release_camera))
        .route("/status", get(status))
        .with_state(service)
}

/// Serve until Ctrl+C, then release every camera so open streams end
pub async fn serve(service: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("MJPEG endpoint: http://{}/video_feed/<camera_id>", addr);

    let app = router(service.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await
}

async fn shutdown_signal(service: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Shutting down");
    if let Err(e) = tokio::task::spawn_blocking(move || service.shutdown()).await {
        tracing::error!(error = %e, "Failed to release cameras on shutdown");
    }
}

async fn list_cameras(State(service): State<AppState>) -> Result<Response, Response> {
    let cameras = blocking(move || service.list_cameras()).await?;
    Ok(Json(json!({ "cameras": cameras })).into_response())
}

async fn status(State(service): State<AppState>) -> Result<Response, Response> {
    let status = blocking(move || service.status()).await?;
    Ok(Json(status).into_response())
}

async fn release_camera(
    State(service): State<AppState>,
    Path(camera_id): Path<CameraId>,
) -> Result<Response, Response> {
    blocking(move || service.release(camera_id)).await?;
    Ok(Json(json!({ "status": "released", "camera_id": camera_id })).into_response())
}

async fn capture_snapshot(
    State(service): State<AppState>,
    Path(camera_id): Path<CameraId>,
) -> Result<Response, Response> {
    let artifact_id = blocking(move || service.capture(camera_id))
        .await?
        .map_err(IntoResponse::into_response)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "artifact_id": artifact_id, "camera_id": camera_id })),
    )
        .into_response())
}

async fn delete_snapshot(
    State(service): State<AppState>,
    Path(artifact_id): Path<String>,
) -> Result<Response, Response> {
    let id = artifact_id.clone();
    blocking(move || service.delete_snapshot(&id))
        .await?
        .map_err(IntoResponse::into_response)?;
    Ok(Json(json!({ "status": "deleted", "artifact_id": artifact_id })).into_response())
}

/// Cancels the stream when the response body is dropped (viewer disconnected)
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn video_feed(
    State(service): State<AppState>,
    Path(camera_id): Path<CameraId>,
) -> Result<Response, Response> {
    let frames = blocking(move || service.stream(camera_id))
        .await?
        .map_err(IntoResponse::into_response)?;
    tracing::info!(camera_id, "Viewer connected");

    let cancel_on_drop = CancelOnDrop(frames.cancel_token());
    let parts = futures::stream::unfold(Some(frames), move |state| {
        let _viewer = &cancel_on_drop;
        next_part(state)
    });

    Ok((
        [
            (header::CONTENT_TYPE, stream::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
        .into_response())
}

async fn next_part(
    state: Option<FrameStream>,
) -> Option<(Result<Bytes, Error>, Option<FrameStream>)> {
    let mut frames = state?;
    let (item, frames) = tokio::task::spawn_blocking(move || {
        let item = frames.next();
        (item, frames)
    })
    .await
    .ok()?;

    match item {
        Some(Ok(frame)) => Some((Ok(Bytes::from(frame.to_multipart())), Some(frames))),
        Some(Err(e)) => Some((Err(e), None)),
        None => {
            tracing::info!(camera_id = frames.camera_id(), frames = frames.frames(), "Stream ended");
            None
        }
    }
}
