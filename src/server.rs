//! HTTP server for the query RPC and storage notifications.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer a question (bearer token required) |
//! | `POST` | `/events/storage` | Object-finalized notification; may start ingestion |
//! | `GET`  | `/health` | Health check (version and chunk count) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid-argument", "message": "The function must be called with a 'question'." } }
//! ```
//!
//! Error codes: `unauthenticated` (401), `invalid-argument` (400),
//! `internal` (500). Internal errors never carry upstream detail.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser clients can
//! call the query endpoint directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::QueryError;
use crate::models::{QueryRequest, QueryResponse, StorageEvent};
use crate::services::Services;

#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
}

/// Build the router over already-initialised services.
pub fn router(services: Arc<Services>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/events/storage", post(handle_storage_event))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { services })
}

/// Initialise services once and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Arc::new(Services::init(config).await?);
    let app = router(services);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("manual-assist listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
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

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let status = match err {
            QueryError::Unauthenticated => StatusCode::UNAUTHORIZED,
            QueryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            QueryError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ POST /query ============

/// The bearer token is checked before the body is looked at, so an
/// unauthenticated caller learns nothing about request validation.
async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let principal = state
        .services
        .authenticator()
        .authenticate(header)
        .ok_or(QueryError::Unauthenticated)?;

    let Json(request) =
        body.map_err(|rejection| QueryError::InvalidArgument(rejection.body_text()))?;

    let response = state
        .services
        .orchestrator()
        .answer(Some(&principal), request)
        .await?;
    Ok(Json(response))
}

// ============ POST /events/storage ============

#[derive(Serialize)]
struct EventResponse {
    status: &'static str,
}

/// Accepts an upload notification. Matching events are ingested on a
/// background task; the outcome only shows up in the logs.
async fn handle_storage_event(
    State(state): State<AppState>,
    body: Result<Json<StorageEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let Json(event) =
        body.map_err(|rejection| QueryError::InvalidArgument(rejection.body_text()))?;

    let pipeline = state.services.pipeline().clone();
    if !pipeline.accepts(&event) {
        return Ok((StatusCode::OK, Json(EventResponse { status: "ignored" })));
    }

    tokio::spawn(async move {
        pipeline.handle_event(&event).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(EventResponse { status: "accepted" }),
    ))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    chunks: usize,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let chunks = state.services.store().count().await.map_err(|e| {
        error!(error = %e, "health check failed");
        AppError::from(QueryError::Internal)
    })?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks,
    }))
}
