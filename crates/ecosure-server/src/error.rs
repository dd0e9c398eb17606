//! Relay and HTTP error types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ecosure_assistants::AssistantError;
use ecosure_contracts::ErrorBody;
use thiserror::Error;

/// Why a chat turn ended with an `error` event. `Display` is the event text.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Provide a message or at least one file.")]
    EmptyInput,

    #[error("Server not configured with ASSISTANT_ID")]
    MissingAssistantId,

    #[error("Server not configured with OPENAI_API_KEY")]
    MissingApiKey,

    #[error("Invalid ASSISTANT_ID or not accessible with this API key.")]
    InvalidAssistant,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Failed to stage uploaded file: {0}")]
    Staging(#[from] std::io::Error),

    #[error("{0}")]
    Upstream(#[from] AssistantError),

    /// Failure reported inside the run's own event stream.
    #[error("{0}")]
    Stream(String),

    #[error("Run status: {status}. {reason}")]
    RunIncomplete { status: String, reason: String },

    #[error("Assistant requires action which is not implemented on server.")]
    RequiresAction,

    #[error("Stream timeout")]
    Timeout,

    #[error(
        "No assistant output was produced for this run. Check assistant configuration (model/instructions/tools) and permissions."
    )]
    NoOutput,
}

impl RelayError {
    /// Rejected before anything was created upstream.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput
                | Self::MissingAssistantId
                | Self::MissingApiKey
                | Self::InvalidAssistant
                | Self::InvalidRequest(_)
        )
    }
}

/// Errors of the plain JSON endpoints.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed upstream");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
