//! Request and response bodies of the relay's plain HTTP surface.

use serde::{Deserialize, Serialize};

/// Multipart field carrying the user's message.
pub const FIELD_MESSAGE: &str = "message";
/// Multipart field carrying the thread to continue.
pub const FIELD_THREAD_ID: &str = "threadId";
/// Multipart field name repeated once per attached file.
pub const FIELD_FILES: &str = "files";

/// JSON body of `POST /api/chat/stream`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(
        default,
        rename = "threadId",
        alias = "thread_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub thread_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            thread_id: None,
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

/// Error body of the non-streaming endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub ok: bool,
}
