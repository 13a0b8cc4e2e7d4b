//! HTTP API server.
//!
//! Thin boundary layer over the [`Registry`](crate::registry::Registry)
//! controller. Parses request parameters, resolves the caller identity from
//! the `X-Username` header, and maps controller error kinds to HTTP status
//! codes. No business rules live here.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/metadata/{token}` | Fetch one document (id or slug) or `all` |
//! | `POST` | `/api/metadata` | Register the request body as a new document |
//! | `PUT`  | `/api/metadata/{id}` | Set/clear slug (`{"slug": ...}`) or refresh (`{}`) |
//! | `DELETE` | `/api/metadata/{id}` | Delete a document (owner only) |
//! | `GET`  | `/api/query` | Full-text search over registered documents |
//! | `POST` | `/api/validate` | Validate a document without registering |
//! | `GET`  | `/api/suggestion` | Term aggregation over a field |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "conflict", "message": "document already exists, not saved" } }
//! ```
//!
//! Codes: `validation_error` / `identity_error` (400), `unauthorized` (401),
//! `ownership_error` (403), `not_found` (404), `conflict` (409),
//! `store_unavailable` (503).

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::models::SchemaViolation;
use crate::registry::{ErrorKind, GetOptions, GetResult, RegisterOptions, Registry, RegistryError};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
}

/// Starts the HTTP server. Binds to `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config, registry: Arc<Registry>) -> anyhow::Result<()> {
    let state = AppState { registry };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/metadata", post(handle_register))
        .route(
            "/api/metadata/{token}",
            get(handle_get).put(handle_put).delete(handle_delete),
        )
        .route("/api/query", get(handle_query))
        .route("/api/validate", post(handle_validate))
        .route("/api/suggestion", get(handle_suggestion))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("registry server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code.
    code: String,
    /// Human-readable error message.
    message: String,
    /// Structured violations, present for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<SchemaViolation>>,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<Vec<SchemaViolation>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation | ErrorKind::Identity => StatusCode::BAD_REQUEST,
            ErrorKind::Ownership => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Store => StatusCode::SERVICE_UNAVAILABLE,
        };
        let details = match &err {
            RegistryError::Validation(violations) => Some(violations.clone()),
            _ => None,
        };
        AppError {
            status,
            code: err.kind().as_str().to_string(),
            message: err.to_string(),
            details,
        }
    }
}

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: "you must log in first".to_string(),
        details: None,
    }
}

/// Caller identity resolved by the (external) authentication layer and
/// forwarded as a header. The core treats it as an opaque trusted string.
fn caller(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-username")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/validate ============

async fn handle_validate(body: Bytes) -> Json<serde_json::Value> {
    let report = crate::metadata::validate(&body);
    Json(serde_json::json!({
        "valid": report.valid,
        "errors": report.errors,
    }))
}

// ============ GET /api/metadata/{token} ============

#[derive(Deserialize)]
struct GetParams {
    /// Comma-separated top-level fields to return.
    fields: Option<String>,
    size: Option<i64>,
    #[serde(rename = "from")]
    from_: Option<i64>,
    #[serde(default)]
    include_archived: bool,
}

async fn handle_get(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(params): Query<GetParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let opts = GetOptions {
        fields: params
            .fields
            .map(|f| f.split(',').map(|s| s.trim().to_string()).collect()),
        include_archived: params.include_archived,
        page_size: params.size,
        offset: params.from_.unwrap_or(0),
    };
    let result = state.registry.get(&token, &opts).await?;
    let value = match result {
        GetResult::One(v) => v,
        GetResult::Many(vs) => serde_json::Value::Array(vs),
    };
    Ok(Json(value))
}

// ============ GET /api/query ============

#[derive(Deserialize)]
struct QueryParams {
    q: String,
    fields: Option<String>,
    size: Option<i64>,
    #[serde(rename = "from")]
    from_: Option<i64>,
}

async fn handle_query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let opts = GetOptions {
        fields: params
            .fields
            .map(|f| f.split(',').map(|s| s.trim().to_string()).collect()),
        include_archived: false,
        page_size: params.size,
        offset: params.from_.unwrap_or(0),
    };
    let hits = state.registry.search(&params.q, &opts).await?;
    Ok(Json(serde_json::json!({ "total": hits.len(), "hits": hits })))
}

// ============ POST /api/metadata ============

#[derive(Deserialize)]
struct RegisterParams {
    /// Origin URL recorded for refresh.
    url: String,
    #[serde(default)]
    overwrite: bool,
    #[serde(default)]
    reset_meta: bool,
    #[serde(default)]
    dryrun: bool,
}

async fn handle_register(
    State(state): State<AppState>,
    Query(params): Query<RegisterParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = caller(&headers).ok_or_else(unauthorized)?;

    let opts = RegisterOptions {
        source_url: params.url,
        allow_overwrite: params.overwrite,
        require_same_owner: true,
        reset_meta: params.reset_meta,
        dry_run: params.dryrun,
    };
    let registration = state.registry.register(&body, &user, &opts).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "_id": registration.id,
        "created": registration.created,
    })))
}

// ============ PUT /api/metadata/{id} ============

#[derive(Deserialize, Default)]
struct PutBody {
    /// `Some("name")` sets the slug, `Some("")` clears it, absent refreshes.
    slug: Option<String>,
}

async fn handle_put(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    // An empty body means refresh.
    let body: PutBody = if body.is_empty() {
        PutBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error".to_string(),
            message: format!("invalid request body: {}", e),
            details: None,
        })?
    };

    match body.slug {
        Some(slug) => {
            let user = caller(&headers).ok_or_else(unauthorized)?;
            let new_slug = if slug.is_empty() {
                None
            } else {
                Some(slug.as_str())
            };
            state.registry.set_alias(&id, &user, new_slug).await?;
            Ok(Json(serde_json::json!({ "success": true })))
        }
        None => {
            let report = state.registry.refresh(&id).await?;
            Ok(Json(serde_json::json!({
                "success": report.success,
                "status": report.status.as_str(),
            })))
        }
    }
}

// ============ DELETE /api/metadata/{id} ============

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = caller(&headers).ok_or_else(unauthorized)?;
    state.registry.delete(&id, &user).await?;
    Ok(Json(serde_json::json!({ "success": true, "_id": id })))
}

// ============ GET /api/suggestion ============

#[derive(Deserialize)]
struct SuggestionParams {
    field: String,
    size: Option<usize>,
}

async fn handle_suggestion(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let buckets = state
        .registry
        .get_tag_values(&params.field, params.size.unwrap_or(100))
        .await?;
    Ok(Json(serde_json::json!({ "field": params.field, "values": buckets })))
}
