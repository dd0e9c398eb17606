//! Events carried on the chat stream.
//!
//! A request yields zero or more `chunk` events followed by exactly one
//! terminal event, `done` or `error`. `debug` events only appear when the
//! relay runs with verbose upstream tracing and never terminate a stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sse::SseFrame;

pub const EVENT_CHUNK: &str = "chunk";
pub const EVENT_DONE: &str = "done";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_DEBUG: &str = "debug";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DonePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DebugPayload {
    event: String,
    #[serde(default)]
    data: Value,
}

/// A single event on the chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(ChunkPayload),
    Done(DonePayload),
    Error(ErrorPayload),
    Debug { event: String, data: Value },
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk(ChunkPayload { text: text.into() })
    }

    pub fn done(thread_id: impl Into<String>, message_id: Option<String>) -> Self {
        Self::Done(DonePayload {
            thread_id: Some(thread_id.into()),
            message_id,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            error: Some(message.into()),
        })
    }

    pub fn debug(event: impl Into<String>, data: Value) -> Self {
        Self::Debug {
            event: event.into(),
            data,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chunk(_) => EVENT_CHUNK,
            Self::Done(_) => EVENT_DONE,
            Self::Error(_) => EVENT_ERROR,
            Self::Debug { .. } => EVENT_DEBUG,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }

    /// JSON payload as written on the `data:` line.
    pub fn data_json(&self) -> String {
        let encoded = match self {
            Self::Chunk(payload) => serde_json::to_string(payload),
            Self::Done(payload) => serde_json::to_string(payload),
            Self::Error(payload) => serde_json::to_string(payload),
            Self::Debug { event, data } => serde_json::to_string(&DebugPayload {
                event: event.clone(),
                data: data.clone(),
            }),
        };
        // Plain structs of strings and JSON values always serialize.
        encoded.unwrap_or_else(|_| "{}".to_string())
    }

    pub fn to_frame(&self) -> SseFrame {
        SseFrame::new(self.name(), self.data_json())
    }

    /// Interprets a decoded frame. Unknown event names yield `None`; a
    /// payload that fails to parse is treated as an empty payload.
    pub fn from_frame(frame: &SseFrame) -> Option<Self> {
        let event = match frame.event.as_str() {
            EVENT_CHUNK => Self::Chunk(parse_or_default(&frame.data)),
            EVENT_DONE => Self::Done(parse_or_default(&frame.data)),
            EVENT_ERROR => Self::Error(parse_or_default(&frame.data)),
            EVENT_DEBUG => {
                let payload: Option<DebugPayload> = serde_json::from_str(&frame.data).ok();
                match payload {
                    Some(DebugPayload { event, data }) => Self::Debug { event, data },
                    None => Self::Debug {
                        event: String::new(),
                        data: Value::Null,
                    },
                }
            }
            _ => return None,
        };
        Some(event)
    }
}

fn parse_or_default<T>(data: &str) -> T
where
    T: for<'de> Deserialize<'de> + Default,
{
    serde_json::from_str(data).unwrap_or_default()
}
