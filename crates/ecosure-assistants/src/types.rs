//! Wire types of the assistant service.

use std::pin::Pin;

use bytes::Bytes;
use ecosure_contracts::{ContentPart, NormalizedMessage, Role};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Filename used for file parts the service did not name.
pub const DEFAULT_DOWNLOAD_NAME: &str = "download";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// Metadata of a file held by the service's file store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentTool {
    #[serde(rename = "type")]
    pub kind: String,
}

/// A file bound to a message, searchable by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    pub tools: Vec<AttachmentTool>,
}

impl Attachment {
    pub fn file_search(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            tools: vec![AttachmentTool {
                kind: "file_search".to_string(),
            }],
        }
    }
}

/// Body for posting a message to a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// A message as stored by the service. Content parts stay as raw JSON so
/// unknown part types survive untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub content: Vec<Value>,
}

impl ThreadMessage {
    /// Non-empty text values of the message, in order.
    pub fn text_parts(&self) -> impl Iterator<Item = &str> {
        self.content
            .iter()
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|part| part.pointer("/text/value").and_then(Value::as_str))
            .filter(|text| !text.is_empty())
    }

    pub fn text(&self) -> String {
        self.text_parts().collect()
    }

    pub fn normalize(&self) -> NormalizedMessage {
        NormalizedMessage {
            id: self.id.clone(),
            role: self.role,
            created_at: self
                .created_at
                .unwrap_or_else(|| chrono::Utc::now().timestamp()),
            parts: self.content.iter().map(normalize_part).collect(),
        }
    }
}

fn normalize_part(part: &Value) -> ContentPart {
    let str_at = |pointer: &str| part.pointer(pointer).and_then(Value::as_str);

    match part.get("type").and_then(Value::as_str) {
        Some("text") => ContentPart::Text {
            text: str_at("/text/value").unwrap_or_default().to_string(),
        },
        Some("image_file") => ContentPart::Image {
            file_id: str_at("/image_file/file_id").unwrap_or_default().to_string(),
        },
        Some("file_path") => ContentPart::File {
            file_id: str_at("/file_path/file_id").unwrap_or_default().to_string(),
            filename: str_at("/file_path/filename")
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_DOWNLOAD_NAME)
                .to_string(),
        },
        other => ContentPart::Other {
            kind: other.unwrap_or("unknown").to_string(),
            raw: part.clone(),
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

/// An execution of an assistant against a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub last_error: Option<RunError>,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
}

impl Run {
    pub const STATUS_COMPLETED: &'static str = "completed";

    pub fn is_completed(&self) -> bool {
        self.status == Self::STATUS_COMPLETED
    }

    /// Best available explanation of why the run did not complete.
    pub fn failure_reason(&self) -> String {
        self.last_error
            .as_ref()
            .and_then(|err| err.message.clone())
            .or_else(|| {
                self.incomplete_details
                    .as_ref()
                    .and_then(|details| details.reason.clone())
            })
            .unwrap_or_else(|| "Run did not complete".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Page request for a thread's messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListMessages {
    pub order: SortOrder,
    pub limit: u32,
}

impl ListMessages {
    /// Full conversation, oldest first.
    pub fn chronological() -> Self {
        Self {
            order: SortOrder::Asc,
            limit: 100,
        }
    }

    /// The handful of most recent messages, newest first.
    pub fn latest() -> Self {
        Self {
            order: SortOrder::Desc,
            limit: 5,
        }
    }
}

/// One raw frame of a streaming run: upstream event name plus JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEvent {
    pub name: String,
    pub data: Value,
}

impl UpstreamEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

pub type UpstreamEventStream = Pin<Box<dyn Stream<Item = Result<UpstreamEvent>> + Send>>;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;
