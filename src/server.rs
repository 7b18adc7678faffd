//! HTTP control plane
//!
//! Thin axum layer over [`SessionRegistry`]. Registry calls block on
//! session joins and file IO, so handlers hand them to the blocking pool.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::errors::{RecorderError, Result};
use crate::registry::{RegistryStatus, SessionRegistry};

/// Multipart field carrying an uploaded recording
pub const UPLOAD_FIELD: &str = "video";

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

impl IntoResponse for RecorderError {
    fn into_response(self) -> Response {
        let status = match self {
            RecorderError::AlreadyActive(_) => StatusCode::CONFLICT,
            RecorderError::NotFound(_) => StatusCode::NOT_FOUND,
            RecorderError::InvalidRequest(_) | RecorderError::Config(_) => StatusCode::BAD_REQUEST,
            RecorderError::Device(_) | RecorderError::Encode(_) | RecorderError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the router with all endpoints
pub fn router(registry: Arc<SessionRegistry>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/test", get(cors_check))
        .route("/record/start", post(start_recording))
        .route("/record/stop", post(stop_recording))
        .route("/record/status", get(recording_status))
        .route("/upload", post(upload_video))
        .route("/video/:filename", get(download_video))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(AppState { registry })
}

/// Bind to the configured address and serve until Ctrl-C
pub async fn serve(config: &ServerConfig, registry: Arc<SessionRegistry>) -> Result<()> {
    let addr: SocketAddr = config.bind.parse().map_err(|e| {
        RecorderError::Config(format!("Invalid bind address {:?}: {}", config.bind, e))
    })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RecorderError::Io(format!("Failed to bind to {}: {}", addr, e)))?;

    serve_with_shutdown(listener, registry, config.max_upload_bytes, ctrl_c()).await
}

/// Serve on an already bound listener until `shutdown` resolves, then stop
/// any active recording so its file is finalized before returning.
pub async fn serve_with_shutdown<F>(
    listener: tokio::net::TcpListener,
    registry: Arc<SessionRegistry>,
    max_upload_bytes: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("Recording control server listening on {}", addr);
    }

    let app = router(registry.clone(), max_upload_bytes);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RecorderError::Io(format!("Server error: {}", e)))?;

    log::info!("Server shut down, stopping any active recording");
    match blocking(registry, |r| r.stop()).await {
        Ok(Some(summary)) => log::info!(
            "Finalized {} with {} frames on shutdown",
            summary.filename,
            summary.frames_written
        ),
        Ok(None) => {}
        Err(e) => log::warn!("Active recording ended with an error: {}", e),
    }
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Run a registry call on the blocking pool
async fn blocking<T, F>(registry: Arc<SessionRegistry>, f: F) -> Result<T>
where
    F: FnOnce(&SessionRegistry) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&registry))
        .await
        .map_err(|e| RecorderError::Io(format!("registry task failed: {}", e)))?
}

async fn cors_check() -> Json<Value> {
    Json(json!({ "message": "CORS is working!" }))
}

async fn start_recording(State(state): State<AppState>) -> Result<Json<Value>> {
    let filename = blocking(state.registry, |r| r.start()).await?;
    Ok(Json(json!({
        "message": "Recording started",
        "filename": filename,
    })))
}

async fn stop_recording(State(state): State<AppState>) -> Result<Json<Value>> {
    let summary = blocking(state.registry, |r| r.stop()).await?;
    Ok(Json(json!({
        "message": "Recording stopped",
        "summary": summary,
    })))
}

async fn recording_status(State(state): State<AppState>) -> Result<Json<RegistryStatus>> {
    let status = blocking(state.registry, |r| Ok(r.status())).await?;
    Ok(Json(status))
}

async fn upload_video(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    match read_upload(&mut multipart).await {
        Ok(Some((filename, data))) => {
            match blocking(state.registry, move |r| r.upload(&filename, &data)).await {
                Ok(filename) => Json(json!({ "filename": filename })).into_response(),
                Err(e) => e.into_response(),
            }
        }
        Ok(None) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No video file uploaded" })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Pull the first `video` part out of the form
async fn read_upload(multipart: &mut Multipart) -> Result<Option<(String, bytes::Bytes)>> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| RecorderError::InvalidRequest(format!("Malformed upload: {}", e)))?;
        let Some(field) = field else {
            return Ok(None);
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| RecorderError::InvalidRequest("Upload has no file name".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| RecorderError::InvalidRequest(format!("Failed to read upload: {}", e)))?;
        return Ok(Some((filename, data)));
    }
}

async fn download_video(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    match blocking(state.registry, move |r| r.fetch(&filename)).await {
        Ok(data) => ([(header::CONTENT_TYPE, "video/mp4")], data).into_response(),
        Err(RecorderError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Video not found" })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
