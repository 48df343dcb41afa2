//! HTTP API over a shared [`Coach`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Status and version |
//! | `GET`    | `/documents` | Document summaries |
//! | `POST`   | `/documents` | Ingest `{text, metadata?}` |
//! | `DELETE` | `/documents/{id}` | Remove a document |
//! | `POST`   | `/search` | Ranked chunks for `{query, k?}` |
//! | `POST`   | `/generate` | Full answer for `{question, session_id?}` |
//! | `POST`   | `/generate/stream` | Same, as Server-Sent Events |
//! | `GET`    | `/sessions/{id}/history` | Stored conversation |
//! | `DELETE` | `/sessions/{id}` | Forget a conversation |
//! | `GET`    | `/rate-limit/{key}` | Pacing statistics |
//!
//! Errors use `{ "error": { "code": ..., "message": ... } }` with codes
//! from [`CoachError::kind`] plus `not_found`.
//!
//! The stream emits `delta` events (`{"text"}`) followed by exactly one
//! terminal event: `done` (`{"session_id"}`) or `error` (`{"code",
//! "message"}`). A stream that ends without either was cut by the
//! transport.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use interview_coach_core::models::{ConversationTurn, DocumentSummary, Metadata, SearchHit};

use crate::coach::Coach;
use crate::config::Config;
use crate::error::CoachError;
use crate::generate::{Answer, StreamEvent};
use crate::rate_limiter::RateLimitStats;

const DEFAULT_SEARCH_K: usize = 5;

#[derive(Clone)]
struct AppState {
    coach: Arc<Coach>,
}

/// Opens the coach from `config` and serves until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let coach = Arc::new(Coach::from_config(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "HTTP server listening");
    println!("Interview coach listening on http://{}", config.server.bind);
    axum::serve(listener, router(coach)).await?;
    Ok(())
}

pub fn router(coach: Arc<Coach>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_list_documents).post(handle_add_document))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/search", post(handle_search))
        .route("/generate", post(handle_generate))
        .route("/generate/stream", post(handle_generate_stream))
        .route("/sessions/{id}/history", get(handle_history))
        .route("/sessions/{id}", delete(handle_reset))
        .route("/rate-limit/{key}", get(handle_rate_limit))
        .layer(cors)
        .with_state(AppState { coach })
}

// ============ Errors ============

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

impl From<CoachError> for AppError {
    fn from(err: CoachError) -> Self {
        let status = match &err {
            CoachError::EmptyContent | CoachError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CoachError::Throttling(_) | CoachError::ExhaustedRetries { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            CoachError::Backend(_) | CoachError::StreamInterrupted(_) => StatusCode::BAD_GATEWAY,
            CoachError::Retrieval(_) | CoachError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(CoachError::InvalidRequest(format!("{} must not be empty", field)).into());
    }
    Ok(())
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

// ============ /documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentSummary>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state.coach.list_documents().await?;
    Ok(Json(DocumentListResponse { documents }))
}

#[derive(Deserialize)]
struct AddDocumentRequest {
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Serialize)]
struct AddDocumentResponse {
    id: String,
}

async fn handle_add_document(
    State(state): State<AppState>,
    Json(req): Json<AddDocumentRequest>,
) -> Result<(StatusCode, Json<AddDocumentResponse>), AppError> {
    let id = state.coach.add_document(&req.text, req.metadata).await?;
    Ok((StatusCode::CREATED, Json(AddDocumentResponse { id })))
}

#[derive(Serialize)]
struct DeleteDocumentResponse {
    id: String,
    deleted_chunks: usize,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteDocumentResponse>, AppError> {
    let deleted_chunks = state.coach.delete_document(&id).await?;
    if deleted_chunks == 0 {
        return Err(not_found(format!("document not found: {}", id)));
    }
    Ok(Json(DeleteDocumentResponse { id, deleted_chunks }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    require("query", &req.query)?;
    let results = state
        .coach
        .search_documents(&req.query, req.k.unwrap_or(DEFAULT_SEARCH_K))
        .await?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /generate ============

#[derive(Deserialize)]
struct GenerateRequest {
    question: String,
    session_id: Option<String>,
}

async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<Answer>, AppError> {
    let answer = state
        .coach
        .generate(&req.question, req.session_id.as_deref())
        .await?;
    Ok(Json(answer))
}

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

async fn handle_generate_stream(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Sse<KeepAliveStream<EventStream>>, AppError> {
    require("question", &req.question)?;
    let events = state
        .coach
        .stream_generate(&req.question, req.session_id.as_deref())
        .map(|event| Ok(to_sse(event)))
        .boxed();
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse(event: StreamEvent) -> Event {
    let (name, payload) = match event {
        StreamEvent::Delta(text) => ("delta", serde_json::json!({ "text": text })),
        StreamEvent::Done { session_id } => ("done", serde_json::json!({ "session_id": session_id })),
        StreamEvent::Failed(err) => (
            "error",
            serde_json::json!({ "code": err.kind(), "message": err.to_string() }),
        ),
    };
    Event::default().event(name).data(payload.to_string())
}

// ============ /sessions ============

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    turns: Vec<ConversationTurn>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<HistoryResponse> {
    let turns = state.coach.history(&id);
    Json(HistoryResponse { session_id: id, turns })
}

#[derive(Serialize)]
struct ResetResponse {
    session_id: String,
    existed: bool,
}

async fn handle_reset(State(state): State<AppState>, Path(id): Path<String>) -> Json<ResetResponse> {
    let existed = state.coach.reset(&id);
    Json(ResetResponse { session_id: id, existed })
}

// ============ GET /rate-limit/{key} ============

async fn handle_rate_limit(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<RateLimitStats> {
    Json(state.coach.rate_limit_stats(&key).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (CoachError::EmptyContent, StatusCode::BAD_REQUEST),
            (CoachError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                CoachError::ExhaustedRetries {
                    attempts: 3,
                    last: "slow down".into(),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (CoachError::Throttling("slow down".into()), StatusCode::TOO_MANY_REQUESTS),
            (CoachError::Backend("401".into()), StatusCode::BAD_GATEWAY),
            (CoachError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let kind = err.kind();
            let app: AppError = err.into();
            assert_eq!(app.status, status);
            assert_eq!(app.code, kind);
        }
    }
}
