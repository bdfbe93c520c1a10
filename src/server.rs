//! HTTP API over one document QA session.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Index readiness, indexed files, chunk count |
//! | `POST` | `/documents` | Upload documents and rebuild the index |
//! | `GET`  | `/documents/{filename}` | Download an indexed file |
//! | `POST` | `/ask` | Answer a question with cited sources |
//! | `GET`  | `/history` | Answered questions, newest first |
//! | `DELETE` | `/history` | Clear the history |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "index_not_ready", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `index_not_ready` (409),
//! `ingestion_failed` (422), `index_build_failed`, `retrieval_failed` and
//! `synthesis_failed` (502).
//!
//! # Concurrency
//!
//! The session sits behind an async mutex that is never held across an
//! embedding or chat call. Index builds run unlocked and are swapped in
//! whole, so a question sees either the previous index or the new one.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use docqa_core::error::QaError;
use docqa_core::history::QaEntry;
use docqa_core::prompt::AnswerStyle;
use docqa_core::session::Session;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::extract::DocumentKind;
use crate::ingest::{upload_names, Upload};
use crate::progress::NoProgress;
use crate::qa::{BuildReport, Pipeline};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    session: Arc<Mutex<Session>>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            session: Arc::new(Mutex::new(Session::new())),
        }
    }
}

/// Routes with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/documents", post(handle_upload))
        .route("/documents/{filename}", get(handle_download))
        .route("/ask", post(handle_ask))
        .route("/history", get(handle_history).delete(handle_clear_history))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        embedding_model = pipeline.embedding_model(),
        "docqa server listening"
    );
    println!("docqa server listening on http://{}", config.server.bind);
    serve(listener, pipeline).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, pipeline: Pipeline) -> anyhow::Result<()> {
    axum::serve(listener, router(AppState::new(pipeline))).await?;
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<QaError> for AppError {
    fn from(err: QaError) -> Self {
        let status = match &err {
            QaError::EmptyQuestion => StatusCode::BAD_REQUEST,
            QaError::IndexNotReady => StatusCode::CONFLICT,
            QaError::Ingestion { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            QaError::IndexBuild(_) | QaError::Retrieval(_) | QaError::Synthesis(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
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

// ============ GET /status ============

#[derive(Serialize)]
struct StatusResponse {
    index_ready: bool,
    files: Vec<String>,
    chunk_count: usize,
    answer_style: AnswerStyle,
    history_len: usize,
}

fn status_of(session: &Session) -> StatusResponse {
    StatusResponse {
        index_ready: session.is_ready(),
        files: session.files().to_vec(),
        chunk_count: session.chunk_count(),
        answer_style: session.answer_style,
        history_len: session.history().len(),
    }
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let session = state.session.lock().await;
    Json(status_of(&session))
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct UploadRequest {
    files: Vec<UploadFile>,
    /// Rebuild even if the same file names are already indexed.
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct UploadFile {
    filename: String,
    content_base64: String,
}

#[derive(Serialize)]
struct UploadResponse {
    rebuilt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<BuildReport>,
    status: StatusResponse,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    if req.files.is_empty() {
        return Err(bad_request("files must not be empty"));
    }
    let mut uploads = Vec::with_capacity(req.files.len());
    for file in req.files {
        let filename = file.filename.trim().to_string();
        if filename.is_empty() || filename.contains(['/', '\\']) {
            return Err(bad_request(format!("invalid filename: '{}'", file.filename)));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(file.content_base64.as_bytes())
            .map_err(|e| bad_request(format!("{}: invalid base64: {}", filename, e)))?;
        uploads.push(Upload::new(filename, bytes));
    }

    let names = upload_names(&uploads);
    {
        let session = state.session.lock().await;
        if !req.force && !session.needs_rebuild(&names) {
            return Ok(Json(UploadResponse {
                rebuilt: false,
                report: None,
                status: status_of(&session),
            }));
        }
    }

    let (corpus, report) = state.pipeline.build_corpus(uploads, &NoProgress).await?;

    let mut session = state.session.lock().await;
    session.install(corpus);
    Ok(Json(UploadResponse {
        rebuilt: true,
        report: Some(report),
        status: status_of(&session),
    }))
}

// ============ GET /documents/{filename} ============

async fn handle_download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let session = state.session.lock().await;
    let bytes = session
        .upload(&filename)
        .ok_or_else(|| not_found(format!("no indexed file named '{}'", filename)))?
        .to_vec();
    let content_type = DocumentKind::from_filename(&filename)
        .map(|k| k.content_type())
        .unwrap_or("application/octet-stream");
    let disposition = format!(
        "attachment; filename=\"{}\"",
        filename.replace(['"', '\r', '\n'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    style: Option<AnswerStyle>,
}

#[derive(Serialize)]
struct NumberedEntry {
    number: usize,
    #[serde(flatten)]
    entry: QaEntry,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<NumberedEntry>, AppError> {
    if req.question.trim().is_empty() {
        return Err(QaError::EmptyQuestion.into());
    }
    let (index, style) = {
        let session = state.session.lock().await;
        (session.index()?, req.style.unwrap_or(session.answer_style))
    };

    let answer = state.pipeline.answer(&index, &req.question, style).await?;

    let entry = QaEntry::new(req.question.trim(), answer.text, answer.sources, style);
    let mut session = state.session.lock().await;
    let entry = session.record(entry).clone();
    Ok(Json(NumberedEntry {
        number: session.history().len(),
        entry,
    }))
}

// ============ /history ============

#[derive(Serialize)]
struct HistoryResponse {
    entries: Vec<NumberedEntry>,
}

async fn handle_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let session = state.session.lock().await;
    let entries = session
        .history()
        .newest_first()
        .map(|(number, entry)| NumberedEntry {
            number,
            entry: entry.clone(),
        })
        .collect();
    Json(HistoryResponse { entries })
}

async fn handle_clear_history(State(state): State<AppState>) -> StatusCode {
    state.session.lock().await.clear_history();
    StatusCode::NO_CONTENT
}
