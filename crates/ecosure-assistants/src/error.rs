//! Error types for calls to the assistant service

use thiserror::Error;

/// Failures talking to the assistant service
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssistantError {
    /// HTTP status reported by the service, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether repeating an idempotent request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Api {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for assistant service calls
pub type Result<T> = std::result::Result<T, AssistantError>;
