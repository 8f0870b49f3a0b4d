//! HTTP surface: axum router, request/response payloads, and the boundary
//! error type. Handlers lock the shared store, never across an await point,
//! and every failure is answered with a `{"message": ...}` body — no request
//! error is fatal to the process.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::data::Document;
use crate::ingest;
use crate::store::Store;

pub type SharedStore = Arc<Mutex<Store>>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(err) => {
                error!("Request failed: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct LoansResponse {
    loans: Vec<Document>,
    columns: Vec<String>,
    collection: String,
}

#[derive(Debug, Serialize)]
struct CollectionsResponse {
    collections: Vec<String>,
    active: String,
}

#[derive(Debug, Deserialize)]
struct SetActiveRequest {
    collection: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetActiveResponse {
    message: String,
    active: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: String,
    count: usize,
    columns: Vec<String>,
    collection: String,
}

/// Builds the application router. `upload_limit` is the multipart body cap
/// in bytes.
pub fn router(store: SharedStore, upload_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(liveness))
        .route("/api/loans", get(list_loans))
        .route("/api/collections", get(list_collections))
        .route("/api/collections/set-active", post(set_active))
        .route("/api/upload", post(upload))
        .route("/api/columns", get(list_columns))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(cors)
        .with_state(store)
}

fn lock(store: &SharedStore) -> Result<std::sync::MutexGuard<'_, Store>, ApiError> {
    store
        .lock()
        .map_err(|_| ApiError::Internal(anyhow!("Store mutex poisoned")))
}

async fn liveness() -> &'static str {
    "Loan Dashboard API is running"
}

async fn list_loans(State(store): State<SharedStore>) -> Result<Json<LoansResponse>, ApiError> {
    let store = lock(&store)?;
    let collection = store.active().to_string();
    let loans = store.documents(&collection)?;
    let columns = store.columns(&collection)?.unwrap_or_default();
    Ok(Json(LoansResponse {
        loans,
        columns,
        collection,
    }))
}

async fn list_collections(
    State(store): State<SharedStore>,
) -> Result<Json<CollectionsResponse>, ApiError> {
    let mut store = lock(&store)?;
    store.refresh_collections()?;
    Ok(Json(CollectionsResponse {
        collections: store.collections().to_vec(),
        active: store.active().to_string(),
    }))
}

async fn set_active(
    State(store): State<SharedStore>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<SetActiveResponse>, ApiError> {
    let name = match request.collection {
        Some(name) if !name.is_empty() => name,
        _ => {
            return Err(ApiError::BadRequest(
                "Collection name is required".to_string(),
            ))
        }
    };
    let mut store = lock(&store)?;
    if !store.set_active(&name)? {
        warn!("Rejected set-active for unknown collection '{name}'");
        return Err(ApiError::NotFound("Collection not found".to_string()));
    }
    info!("Active collection set to '{name}'");
    Ok(Json(SetActiveResponse {
        message: "Active collection updated".to_string(),
        active: name,
    }))
}

async fn upload(
    State(store): State<SharedStore>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {e}")))?;
            file = Some((filename, bytes.to_vec()));
        }
    }
    let (filename, bytes) = file.ok_or_else(|| {
        warn!("Upload request without a 'file' field");
        ApiError::BadRequest("No file uploaded".to_string())
    })?;

    let uploaded_at = Utc::now();
    let (collection, dataset) = ingest::prepare_upload(&filename, &bytes, uploaded_at)?;
    info!(
        "Processing upload '{filename}' ({} bytes) into '{collection}'",
        bytes.len()
    );

    let mut store = lock(&store)?;
    store.ingest(&collection, &dataset.columns, &dataset.documents, uploaded_at)?;
    Ok(Json(UploadResponse {
        message: "File uploaded and processed successfully".to_string(),
        count: dataset.row_count(),
        columns: dataset.columns,
        collection,
    }))
}

async fn list_columns(State(store): State<SharedStore>) -> Result<Json<Vec<String>>, ApiError> {
    let store = lock(&store)?;
    let active = store.active().to_string();
    if let Some(columns) = store.columns(&active)? {
        return Ok(Json(columns));
    }
    // No metadata yet: derive from one document's keys, internal fields excluded.
    if let Some(sample) = store.sample_document(&active)? {
        let columns = sample
            .keys()
            .filter(|key| !key.starts_with('_'))
            .cloned()
            .collect();
        return Ok(Json(columns));
    }
    Ok(Json(Vec::new()))
}
