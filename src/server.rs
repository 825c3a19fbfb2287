//! HTTP front-end of a [`Daemon`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness placeholder |
//! | `GET`  | `/status` | Daemon status and sink health |
//! | `GET`  | `/version` | Agent version string |
//! | `POST` | `/uploadfile/` | Run the agent over an uploaded file |
//!
//! An upload answers `201 Created` once the run is over, whatever its
//! outcome: the response acknowledges the file, the run result shows up in
//! `/status`. The run is detached from the request, so a client that hangs
//! up early does not cut it short.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing multipart field 'file'" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::daemon::Daemon;
use crate::source_file::FileSource;

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    /// Shared with the scheduler, if any; every upload triggers a run on it.
    daemon: Arc<Daemon>,
}

pub fn router(daemon: Arc<Daemon>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/status", get(handle_status))
        .route("/version", get(handle_version))
        .route("/uploadfile/", post(handle_upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(AppState { daemon })
}

/// Serve on an already bound listener until `shutdown` fires.
///
/// The daemon is marked running on entry and closed once the server has
/// drained its connections.
pub async fn serve(
    daemon: Arc<Daemon>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    daemon.start();
    info!(%addr, "server listening");

    let app = router(daemon.clone());
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    daemon.close().await;
    result.context("server error")?;
    info!("server stopped");
    Ok(())
}

/// Bind `bind` and [`serve`]. A bind failure puts the daemon in error.
pub async fn run_server(
    daemon: Arc<Daemon>,
    bind: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = match TcpListener::bind(bind).await {
        Ok(listener) => listener,
        Err(e) => {
            daemon.fail(format!("cannot bind {}: {}", bind, e));
            return Err(e).with_context(|| format!("Failed to bind {}", bind));
        }
    };
    serve(daemon, listener, shutdown).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ Handlers ============

async fn handle_root() -> Json<Value> {
    Json(json!({ "message": "Hello World" }))
}

async fn handle_status(State(state): State<AppState>) -> Json<Value> {
    let sink = state.daemon.sink_status().await;
    Json(json!({
        "status": state.daemon.status(),
        "sink": sink,
    }))
}

#[derive(Serialize)]
struct VersionResponse {
    version: String,
}

async fn handle_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: format!("ngsi-agent-{}", env!("CARGO_PKG_VERSION")),
    })
}

#[derive(Serialize)]
struct UploadResponse {
    filename: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("cannot read upload: {}", e)))?;
        info!(%filename, bytes = data.len(), "upload received");

        let mut source = FileSource::from_bytes(filename.clone(), data.to_vec());
        let daemon = state.daemon.clone();
        let run = tokio::spawn(async move { daemon.trigger(&mut source).await });
        match run.await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(%filename, "upload run failed"),
            Err(e) => warn!(%filename, error = %e, "upload run task failed"),
        }
        return Ok((StatusCode::CREATED, Json(UploadResponse { filename })));
    }
    Err(bad_request("missing multipart field 'file'"))
}
