//! HTTP server with a browser chat UI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat and search page |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/chat` | Answer a question within a session |
//! | `POST` | `/api/search` | Return the top-k matching chunks |
//! | `DELETE` | `/api/sessions/{id}` | Forget a session's history |
//! | `POST` | `/api/reindex` | Rebuild the index from the documents directory |
//! | `GET`  | `/api/stats` | Index and session counts |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `storage_error` (500),
//! `model_unavailable` (503). Model failures are logged server-side and
//! reported with a fixed message, so backend details and document text
//! never reach the client.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::Error;
use crate::generation::GenerationOverrides;
use crate::history::ConversationHistory;
use crate::index::IndexStats;
use crate::models::Citation;
use crate::pipeline::Assistant;

const INDEX_HTML: &str = include_str!("../assets/index.html");

const MODEL_UNAVAILABLE_MESSAGE: &str =
    "The language model is currently unavailable. Please try again later.";

/// Conversation histories keyed by session id, bounded by `server.max_sessions`.
///
/// When full, recording a new session drops the least recently used one.
struct SessionStore {
    capacity: usize,
    clock: u64,
    entries: HashMap<String, (u64, ConversationHistory)>,
}

impl SessionStore {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            entries: HashMap::new(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, id: &str) -> Option<ConversationHistory> {
        let now = self.tick();
        self.entries.get_mut(id).map(|(used, history)| {
            *used = now;
            history.clone()
        })
    }

    fn record(&mut self, id: &str, question: &str, answer: &str, fresh: impl FnOnce() -> ConversationHistory) {
        if !self.entries.contains_key(id) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (used, _))| *used)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                tracing::debug!(session = %key, "evicting least recently used session");
                self.entries.remove(&key);
            }
        }
        let now = self.tick();
        let (used, history) = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| (now, fresh()));
        *used = now;
        history.record_exchange(question, answer);
    }

    fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    #[cfg(test)]
    fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    assistant: Assistant,
    /// Never locked across an `.await`.
    sessions: Arc<Mutex<SessionStore>>,
}

impl AppState {
    pub fn new(assistant: Assistant) -> Self {
        let capacity = assistant.config().server.max_sessions;
        Self {
            assistant,
            sessions: Arc::new(Mutex::new(SessionStore::new(capacity))),
        }
    }

    fn with_sessions<T>(&self, f: impl FnOnce(&mut SessionStore) -> T) -> T {
        let mut guard = match self.sessions.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/chat", post(handle_chat))
        .route("/api/search", post(handle_search))
        .route("/api/sessions/{id}", delete(handle_clear_session))
        .route("/api/reindex", post(handle_reindex))
        .route("/api/stats", get(handle_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until the process is terminated.
pub async fn run_server(assistant: Assistant) -> anyhow::Result<()> {
    let bind_addr = assistant.config().server.bind_addr();
    let app = router(AppState::new(assistant));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    println!("Serving on http://{}", bind_addr);
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

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::Configuration(msg) => bad_request(msg),
            Error::Storage(msg) => {
                tracing::error!(error = %msg, "storage failure");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "storage_error",
                    message: "The document index could not be read or written.".to_string(),
                }
            }
            Error::Model(msg) | Error::ModelUnavailable(msg) => {
                tracing::error!(error = %msg, "model failure");
                AppError {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    code: "model_unavailable",
                    message: MODEL_UNAVAILABLE_MESSAGE.to_string(),
                }
            }
        }
    }
}

// ============ GET / and /health ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

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

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    use_history: Option<bool>,
    #[serde(flatten)]
    overrides: GenerationOverrides,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    answer: String,
    sources: Vec<Citation>,
}

/// Answers with the session's history as context, then records the exchange.
///
/// A failed answer leaves the history untouched.
async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let history = if req.use_history.unwrap_or(true) {
        state.with_sessions(|sessions| sessions.get(&session_id))
    } else {
        None
    };

    let answer = state
        .assistant
        .ask(&req.message, history.as_ref(), &req.overrides)
        .await?;

    state.with_sessions(|sessions| {
        sessions.record(&session_id, &req.message, &answer.text, || {
            state.assistant.new_history()
        })
    });

    Ok(Json(ChatResponse {
        session_id,
        answer: answer.text,
        sources: answer.citations,
    }))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchHit {
    rank: usize,
    score: f32,
    source: String,
    chunk_id: String,
    chunk_index: usize,
    text: String,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let k = req.k.unwrap_or(state.assistant.config().retrieval.k);
    let results = state.assistant.search(&req.query, k).await?;

    Ok(Json(SearchResponse {
        results: results
            .into_iter()
            .map(|r| SearchHit {
                rank: r.rank,
                score: r.score,
                source: r.chunk.source,
                chunk_id: r.chunk.id,
                chunk_index: r.chunk.chunk_index,
                text: r.chunk.text,
            })
            .collect(),
    }))
}

// ============ Sessions, reindex, stats ============

async fn handle_clear_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.with_sessions(|sessions| sessions.remove(&id));
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
struct ReindexResponse {
    rebuilt: bool,
    index: IndexStats,
}

async fn handle_reindex(State(state): State<AppState>) -> Result<Json<ReindexResponse>, AppError> {
    let rebuilt = state.assistant.load_or_rebuild(true).await?;
    Ok(Json(ReindexResponse {
        rebuilt,
        index: state.assistant.stats(),
    }))
}

#[derive(Serialize)]
struct StatsResponse {
    index: IndexStats,
    sessions: usize,
    model: String,
}

async fn handle_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        index: state.assistant.stats(),
        sessions: state.with_sessions(|sessions| sessions.len()),
        model: state.assistant.model_name().to_string(),
    })
}
