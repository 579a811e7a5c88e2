//! HTTP API for managing targets, uploading certificates and scraping metrics.

use crate::metrics::MetricsRegistry;
use crate::types::{CreateTargetRequest, UploadResponse};
use crate::writer::StoreHandle;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use sitewatch::{Monitor, TargetId};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state for the API handlers
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub store: StoreHandle,
    pub metrics: Option<Arc<MetricsRegistry>>,
    pub certs_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    async fn refresh_target_count(&self) {
        if let Some(ref m) = self.metrics {
            m.update_target_count(self.monitor.registry().len().await);
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/api/websites", get(list_targets).post(create_target))
        .route("/api/websites/:id", delete(delete_target))
        .route("/api/websites/:id/check", post(check_target))
        .route(
            "/api/upload-certificate",
            post(upload_certificate).layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        );

    if state.metrics.is_some() {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// HTTP API server
pub struct ApiServer {
    state: AppState,
    listen_addr: String,
}

impl ApiServer {
    pub fn new(state: AppState, listen_addr: String) -> Self {
        Self { state, listen_addr }
    }

    /// Serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
        let app = router(self.state);

        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

fn text(status: StatusCode, message: impl Into<String>) -> Response {
    (status, message.into()).into_response()
}

fn parse_id(raw: &str) -> Result<TargetId, Response> {
    raw.parse::<TargetId>()
        .map_err(|_| text(StatusCode::BAD_REQUEST, "Invalid ID format"))
}

async fn list_targets(State(state): State<AppState>) -> Response {
    Json(state.monitor.targets().await).into_response()
}

async fn create_target(
    State(state): State<AppState>,
    payload: Result<Json<CreateTargetRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Rejected create request");
            return text(StatusCode::BAD_REQUEST, "Invalid request format");
        }
    };

    match state.monitor.create_target(req.into_new_target()).await {
        Ok(target) => {
            info!(id = target.id, url = %target.url, "Target created");
            state.refresh_target_count().await;
            (StatusCode::CREATED, Json(target)).into_response()
        }
        Err(e) => text(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn delete_target(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if !state.monitor.delete_target(id).await {
        return text(StatusCode::NOT_FOUND, "Website not found");
    }

    state.store.delete(id).await;
    state.refresh_target_count().await;
    info!(id, "Target deleted");
    StatusCode::NO_CONTENT.into_response()
}

async fn check_target(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.monitor.check_now(id).await {
        Some((target, _)) => Json(target).into_response(),
        None => text(StatusCode::NOT_FOUND, "Website not found"),
    }
}

async fn upload_certificate(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut cert_type = String::new();
    let mut file = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return e.into_response(),
        };

        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("type") => match field.text().await {
                Ok(value) => cert_type = value,
                Err(e) => return e.into_response(),
            },
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(data) => file = Some((filename, data)),
                    Err(e) => return e.into_response(),
                }
            }
            _ => {}
        }
    }

    if cert_type.trim().is_empty() {
        return text(StatusCode::BAD_REQUEST, "Certificate type is required");
    }
    let Some((filename, data)) = file else {
        return text(StatusCode::BAD_REQUEST, "Failed to get file: no file field");
    };

    if let Err(e) = tokio::fs::create_dir_all(&state.certs_dir).await {
        return text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to create certs directory: {e}"),
        );
    }

    let unique = format!(
        "{}_{}",
        chrono::Utc::now().timestamp(),
        sanitize_filename(&filename)
    );
    let path = state.certs_dir.join(unique);
    if let Err(e) = tokio::fs::write(&path, &data).await {
        return text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to save file: {e}"),
        );
    }

    info!(path = %path.display(), cert_type = %cert_type, bytes = data.len(), "Certificate uploaded");
    Json(UploadResponse {
        file_path: path.display().to_string(),
        cert_type,
    })
    .into_response()
}

/// Keep only the final path component, restricted to a safe character set
fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let Some(registry) = state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match registry.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}
