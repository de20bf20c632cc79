//! HTTP server for the portfolio chat widget.
//!
//! Serves the read path over JSON and runs the reindex scheduler in the
//! background for as long as the server is up.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ai/ask-chat` | `{query, conversationMemory?}` → `{answer}` |
//! | `POST` | `/api/ai/create-index` | Regenerate snapshots and reindex now → `{message, chunks}` |
//! | `POST` | `/api/ai/suggest-follow-ups` | `{query, response}` → `{suggestions}` |
//! | `POST` | `/api/ai/snapshot-memory-update` | `{previousMemory?, query, response}` → `{memory}` |
//! | `POST` | `/api/ai/optimize-query` | `{query, conversationMemory?}` → `{optimizedQuery}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `completion_failed` (502),
//! `internal` (500). Completion failures carry a generic message; details
//! go to the log only.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the portfolio
//! frontend can be served from a different origin.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::context::RetrievalContext;
use crate::error::AskError;
use crate::scheduler::{ReindexJob, ReindexScheduler};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    ctx: RetrievalContext,
    /// Used by the on-demand reindex route.
    job: Arc<ReindexJob>,
}

impl AppState {
    pub fn new(ctx: RetrievalContext, job: Arc<ReindexJob>) -> Self {
        Self { ctx, job }
    }
}

/// Build the router with CORS. Exposed so tests can serve it on an
/// ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ai/ask-chat", post(handle_ask_chat))
        .route("/api/ai/create-index", post(handle_create_index))
        .route("/api/ai/suggest-follow-ups", post(handle_suggest_follow_ups))
        .route("/api/ai/snapshot-memory-update", post(handle_memory_update))
        .route("/api/ai/optimize-query", post(handle_optimize_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the scheduler and serve until Ctrl-C, then stop the scheduler.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ctx = RetrievalContext::from_config(config)?;
    let job = Arc::new(ReindexJob::from_config(config, ctx.backend.clone())?);
    let scheduler = ReindexScheduler::start(job.clone());

    let app = router(AppState::new(ctx, job));
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("companion listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("shutting down");
    scheduler.stop().await;
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn completion_failed() -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "completion_failed".to_string(),
        message: "failed to get a response from the assistant".to_string(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<AskError> for AppError {
    fn from(err: AskError) -> Self {
        match err {
            AskError::EmptyQuery => bad_request("query must not be empty"),
            AskError::Completion(e) => {
                error!(error = %e, "completion failed");
                completion_failed()
            }
        }
    }
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

// ============ POST /api/ai/ask-chat ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    conversation_memory: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
}

async fn handle_ask_chat(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let answer = state
        .ctx
        .ask_with_memory(&req.query, req.conversation_memory.as_deref())
        .await?;
    Ok(Json(AskResponse { answer }))
}

// ============ POST /api/ai/create-index ============

#[derive(Serialize)]
struct CreateIndexResponse {
    message: String,
    chunks: usize,
}

async fn handle_create_index(
    State(state): State<AppState>,
) -> Result<Json<CreateIndexResponse>, AppError> {
    let report = state.job.run_forced_cycle().await.map_err(|e| {
        error!(error = %e, "on-demand reindex aborted");
        internal(e.to_string())
    })?;
    if !report.outcome.is_complete() {
        return Err(internal(format!("indexing incomplete: {:?}", report.outcome)));
    }
    Ok(Json(CreateIndexResponse {
        message: "Snapshots regenerated and index rebuilt".to_string(),
        chunks: report.chunks,
    }))
}

// ============ POST /api/ai/suggest-follow-ups ============

#[derive(Deserialize)]
struct FollowUpRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    response: String,
}

#[derive(Serialize)]
struct FollowUpResponse {
    suggestions: Vec<String>,
}

async fn handle_suggest_follow_ups(
    State(state): State<AppState>,
    Json(req): Json<FollowUpRequest>,
) -> Result<Json<FollowUpResponse>, AppError> {
    if req.query.trim().is_empty() || req.response.trim().is_empty() {
        return Err(bad_request("query and response are required"));
    }
    let suggestions = state
        .ctx
        .suggest_follow_ups(&req.query, &req.response)
        .await
        .map_err(|e| {
            error!(error = %e, "follow-up suggestion failed");
            completion_failed()
        })?;
    Ok(Json(FollowUpResponse { suggestions }))
}

// ============ POST /api/ai/snapshot-memory-update ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryUpdateRequest {
    #[serde(default)]
    previous_memory: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    response: String,
}

#[derive(Serialize)]
struct MemoryUpdateResponse {
    memory: String,
}

async fn handle_memory_update(
    State(state): State<AppState>,
    Json(req): Json<MemoryUpdateRequest>,
) -> Result<Json<MemoryUpdateResponse>, AppError> {
    if req.query.trim().is_empty() || req.response.trim().is_empty() {
        return Err(bad_request("query and response are required"));
    }
    let memory = state
        .ctx
        .update_memory(&req.previous_memory, &req.query, &req.response)
        .await
        .map_err(|e| {
            error!(error = %e, "memory update failed");
            completion_failed()
        })?;
    Ok(Json(MemoryUpdateResponse { memory }))
}

// ============ POST /api/ai/optimize-query ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeQueryRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    conversation_memory: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeQueryResponse {
    optimized_query: String,
}

async fn handle_optimize_query(
    State(state): State<AppState>,
    Json(req): Json<OptimizeQueryRequest>,
) -> Result<Json<OptimizeQueryResponse>, AppError> {
    let optimized_query = state
        .ctx
        .optimize_query(&req.conversation_memory, &req.query)
        .await?;
    Ok(Json(OptimizeQueryResponse { optimized_query }))
}
