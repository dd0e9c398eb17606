//! `POST /api/chat/stream`

use axum::body::to_bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use ecosure_contracts::ChatRequest;
use ecosure_contracts::request::{FIELD_FILES, FIELD_MESSAGE, FIELD_THREAD_ID};
use tracing::Instrument;

use super::state::AppState;
use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::relay::sink::{sse_body_stream, sse_response};
use crate::relay::{ChatInput, EventSink, StagedUpload};

/// Largest JSON body accepted.
const MAX_JSON_BODY: usize = 1024 * 1024;
/// Most files a single message may carry.
pub const MAX_FILES: usize = 10;

/// Opens the event stream right away and runs the turn in its own task.
///
/// Every failure, including an unreadable body, is reported as an `error`
/// event; this endpoint never answers with an HTTP error status.
pub async fn chat_stream(State(state): State<AppState>, request: Request) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);
    let (sink, rx) = EventSink::channel(state.config.debug_sse);

    tokio::spawn(
        async move {
            match parse_input(request, &state.config).await {
                Ok(input) => {
                    tracing::debug!(
                        files = input.files.len(),
                        has_thread = input.thread_id.is_some(),
                        "Chat request accepted"
                    );
                    state.relay().run(input, &sink).await;
                }
                Err(err) => {
                    tracing::info!(error = %err, "Unreadable chat request");
                    sink.error(&err.to_string()).await;
                }
            }
        }
        .instrument(span),
    );

    sse_response(sse_body_stream(rx))
}

async fn parse_input(request: Request, config: &ServerConfig) -> Result<ChatInput, RelayError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        });

    if is_multipart {
        let multipart = Multipart::from_request(request, &()).await.map_err(|rejection| {
            RelayError::InvalidRequest(format!(
                "Invalid multipart body: {}",
                rejection.body_text()
            ))
        })?;
        return parse_multipart(multipart, config).await;
    }

    let bytes = to_bytes(request.into_body(), MAX_JSON_BODY)
        .await
        .map_err(|err| RelayError::InvalidRequest(format!("Failed to read request body: {err}")))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(ChatInput::default());
    }

    let body: ChatRequest = serde_json::from_slice(&bytes)
        .map_err(|err| RelayError::InvalidRequest(format!("Invalid JSON body: {err}")))?;
    Ok(ChatInput {
        message: body.message,
        thread_id: body.thread_id,
        files: Vec::new(),
    })
}

async fn parse_multipart(
    mut multipart: Multipart,
    config: &ServerConfig,
) -> Result<ChatInput, RelayError> {
    let mut input = ChatInput::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FIELD_MESSAGE) => input.message = field.text().await.map_err(multipart_error)?,
            Some(FIELD_THREAD_ID) | Some("thread_id") => {
                input.thread_id = Some(field.text().await.map_err(multipart_error)?);
            }
            Some(FIELD_FILES) => {
                if input.files.len() >= MAX_FILES {
                    return Err(RelayError::InvalidRequest(format!(
                        "At most {MAX_FILES} files can be attached to one message."
                    )));
                }
                let mut staged =
                    StagedUpload::create(config.upload_dir.as_deref(), field.file_name())?;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    staged.append(&chunk, config.max_upload_bytes).await?;
                }
                tracing::debug!(filename = staged.filename(), size = staged.len(), "Staged upload");
                input.files.push(staged);
            }
            other => tracing::debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    Ok(input)
}

fn multipart_error(err: MultipartError) -> RelayError {
    RelayError::InvalidRequest(format!("Invalid multipart body: {}", err.body_text()))
}

/// Body limit for the chat route: every file at its cap plus form overhead.
pub fn request_body_limit(config: &ServerConfig) -> usize {
    usize::try_from(config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(MAX_FILES)
        .saturating_add(MAX_JSON_BODY)
}
