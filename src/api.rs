//! HTTP surface for the study guide generator.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /upload` – Multipart upload with a `file` field. Stores the document and returns
//!   `{ "file_name": ... }`, the identifier to pass to `/analyze`.
//! - `POST /analyze` – Run the map-reduce pipeline on a stored document and return the HTML study
//!   guide with the strategy used and chunk counters.
//! - `POST /chat` – Forward a `{role, content}` message list verbatim to the chat model.
//! - `GET /metrics` – Observe pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Failures are returned as `{ "error": "..." }` with a status derived from the error kind.

use crate::extraction::ExtractionError;
use crate::llm::ChatMessage;
use crate::processing::{ProcessingError, Strategy, StudyGuideApi};
use crate::storage::StorageError;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State, multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the study guide API surface.
///
/// `max_upload_bytes` bounds request bodies so oversized uploads are rejected before buffering.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: StudyGuideApi + 'static,
{
    Router::new()
        .route("/upload", post(upload_file::<S>))
        .route("/analyze", post(analyze_file::<S>))
        .route("/chat", post(chat::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    /// Identifier of the stored document.
    file_name: String,
}

/// Store an uploaded document.
///
/// The form must carry a `file` field with a filename; other fields are ignored.
async fn upload_file<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: StudyGuideApi,
{
    let mut multipart = multipart.map_err(|rejection| {
        ProcessingError::InvalidConfiguration(format!(
            "Invalid upload: {}",
            rejection.body_text()
        ))
    })?;
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(|error| {
        ProcessingError::InvalidConfiguration(format!("Failed to read multipart field: {error}"))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|error| {
            ProcessingError::InvalidConfiguration(format!("Failed to read file: {error}"))
        })?;
        upload = Some((file_name, bytes.to_vec()));
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| ProcessingError::InvalidConfiguration("file is required".into()))?;
    let file_name = file_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ProcessingError::InvalidConfiguration("filename is required".into()))?;

    let file_name = service.store_upload(&file_name, bytes).await?;
    Ok(Json(UploadResponse { file_name }))
}

/// Request body for `POST /analyze`.
#[derive(Deserialize)]
struct AnalyzeRequest {
    /// Identifier returned by `POST /upload`.
    #[serde(default)]
    file_name: Option<String>,
}

/// Success response for `POST /analyze`.
#[derive(Serialize)]
struct AnalyzeResponse {
    /// Generated HTML study guide.
    analysis: String,
    /// Whether the document took the short or long path.
    strategy: Strategy,
    /// Number of chunks processed in the map phase.
    chunk_count: usize,
    /// Chunks dropped because their extraction call failed.
    failed_chunks: usize,
}

/// Generate a study guide for a stored document.
async fn analyze_file<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError>
where
    S: StudyGuideApi,
{
    let Json(request) = request.map_err(invalid_body)?;
    let file_name = request
        .file_name
        .ok_or_else(|| ProcessingError::InvalidConfiguration("file_name is required".into()))?;
    let guide = service.analyze(&file_name).await?;
    Ok(Json(AnalyzeResponse {
        analysis: guide.html,
        strategy: guide.strategy,
        chunk_count: guide.chunk_count,
        failed_chunks: guide.failed_chunks,
    }))
}

/// Request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Option<Vec<ChatMessage>>,
}

/// Relay a conversation to the chat model.
async fn chat<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatMessage>, AppError>
where
    S: StudyGuideApi,
{
    let Json(request) = request.map_err(invalid_body)?;
    let messages = request
        .messages
        .ok_or_else(|| ProcessingError::InvalidConfiguration("messages is required".into()))?;
    let reply = service.chat(messages).await?;
    Ok(Json(reply))
}

/// Route body rejections through [`AppError`] so they carry the JSON error payload.
fn invalid_body(rejection: JsonRejection) -> ProcessingError {
    ProcessingError::InvalidConfiguration(format!(
        "Invalid request body: {}",
        rejection.body_text()
    ))
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: StudyGuideApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Store a document sent as multipart/form-data in the `file` field. Response returns { \"file_name\": string }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "analyze",
                method: "POST",
                path: "/analyze",
                description: "Generate an HTML study guide for an uploaded document. Long documents are chunked and summarized before composing. Response returns { \"analysis\": string, \"strategy\": \"short\" | \"long\", \"chunk_count\": number, \"failed_chunks\": number }.",
                request_example: Some(json!({ "file_name": "lecture.pdf" })),
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/chat",
                description: "Forward a chat message list to the model and return its reply.",
                request_example: Some(json!({
                    "messages": [
                        { "role": "system", "content": "Be concise." },
                        { "role": "user", "content": "Explain TCP slow start." }
                    ]
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

struct AppError(ProcessingError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ProcessingError::InvalidConfiguration(_)
            | ProcessingError::Storage(StorageError::InvalidFileName(_)) => StatusCode::BAD_REQUEST,
            ProcessingError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            ProcessingError::Extraction(ExtractionError::NoText) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ProcessingError::Compose(_) | ProcessingError::Chat(_) => StatusCode::BAD_GATEWAY,
            ProcessingError::Extraction(ExtractionError::Reader(_))
            | ProcessingError::Storage(StorageError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self(inner)
    }
}
