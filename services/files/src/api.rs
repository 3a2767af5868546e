use crate::config::ApiConfig;
use crate::error::RegistryError;
use crate::metadata_store::{FileQuery, FileRecord};
use crate::registry::{FileRegistry, UploadRequest};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::PathRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FileRegistry>,
}

/// Response to a successful upload
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadResponse {
    pub id: i64,
    pub filename: String,
    pub object_key: String,
    pub message: String,
}

/// File metadata in API responses
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: i64,
    pub filename: String,
    pub object_key: String,
    pub content_type: Option<String>,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

impl From<FileRecord> for FileResponse {
    fn from(r: FileRecord) -> Self {
        Self {
            id: r.id,
            filename: r.filename,
            object_key: r.object_key,
            content_type: r.content_type,
            size: r.size,
            created_at: r.created_at,
        }
    }
}

/// Query parameters for the file list
#[derive(Debug, Deserialize)]
pub struct FileListQuery {
    /// Maximum results
    pub limit: Option<i64>,
    /// Offset for pagination
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let (status, code) = match &err {
            RegistryError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            RegistryError::ContentMissing { .. } => (StatusCode::NOT_FOUND, "CONTENT_MISSING"),
            RegistryError::DuplicateKey { .. } => (StatusCode::CONFLICT, "DUPLICATE_KEY"),
            RegistryError::StoreUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            RegistryError::InsertFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INSERT_FAILED")
            }
            RegistryError::OrphanCleanupFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ORPHAN_CLEANUP_FAILED")
            }
            RegistryError::DanglingRecord { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DANGLING_RECORD")
            }
            RegistryError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            RegistryError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        };

        if status.is_server_error() {
            error!(error = %err, code, "Request failed");
        }

        api_error(status, code, err.to_string())
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/files", get(list_files).post(upload_file))
        .route("/files/", get(list_files).post(upload_file))
        .route("/files/:id", get(download_file).delete(delete_file))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Service information
async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "File storage API backed by S3 and SQLite",
        "endpoints": {
            "POST /files/": "Upload a file",
            "GET /files/": "List all files",
            "GET /files/{id}": "Download a file",
            "DELETE /files/{id}": "Delete a file"
        }
    }))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "files-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.registry.health().await;

    let describe = |result: Result<(), String>| match result {
        Ok(()) => serde_json::json!({ "status": "connected" }),
        Err(e) => serde_json::json!({ "status": "disconnected", "error": e }),
    };

    let (status, label) = if health.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        warn!("Readiness check failed");
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        status,
        Json(serde_json::json!({
            "status": label,
            "objectStore": describe(health.object_store.map_err(|e| e.to_string())),
            "metadataStore": describe(health.metadata_store.map_err(|e| e.to_string())),
        })),
    )
}

/// Upload the multipart `file` field
#[instrument(skip(state, multipart))]
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileUploadResponse>, ApiError> {
    let mut request = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(e.status(), "INVALID_MULTIPART", e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| api_error(e.status(), "INVALID_MULTIPART", e.body_text()))?;

        request = Some(UploadRequest {
            filename,
            content_type,
            data: data.to_vec(),
        });
        break;
    }

    let request = request.ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "Multipart body has no `file` field",
        )
    })?;

    let outcome = state.registry.upload(request).await?;
    let record = outcome.record;

    Ok(Json(FileUploadResponse {
        id: record.id,
        filename: record.filename,
        object_key: record.object_key,
        message: "File uploaded successfully".to_string(),
    }))
}

/// List files in id order
#[instrument(skip(state))]
async fn list_files(
    State(state): State<AppState>,
    Query(params): Query<FileListQuery>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    if params.limit.is_some_and(|l| l < 0) || params.offset.is_some_and(|o| o < 0) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "limit and offset must not be negative",
        ));
    }

    let query = FileQuery {
        limit: params.limit,
        offset: params.offset,
    };

    let files = state.registry.list_page(&query).await?;
    Ok(Json(files.into_iter().map(FileResponse::from).collect()))
}

/// Unwrap the `:id` segment, answering a malformed one in the usual error shape
fn file_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id).map_err(|rejection| {
        api_error(StatusCode::BAD_REQUEST, "INVALID_ID", rejection.body_text())
    })
}

/// Stream back a file's content as an attachment
#[instrument(skip(state))]
async fn download_file(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = file_id(id)?;
    let download = state.registry.download(id).await?;

    let content_type = HeaderValue::from_str(&download.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(crate::content_type::DEFAULT_CONTENT_TYPE));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&download.filename),
            ),
        ],
        download.data,
    )
        .into_response())
}

/// Delete a file's content and record
#[instrument(skip(state))]
async fn delete_file(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = file_id(id)?;
    state.registry.delete(id).await?;

    Ok(Json(MessageResponse {
        message: format!("File {} deleted successfully", id),
    }))
}

/// Build an `attachment` disposition that survives any filename
///
/// Non-ASCII names get an ASCII fallback plus an RFC 5987 `filename*`.
fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let value = if filename.is_ascii() && !filename.chars().any(|c| c.is_ascii_control()) {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    };

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Start the file API server, draining connections once `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting file API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
