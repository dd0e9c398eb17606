//! Normalized thread messages.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One ordered part of a message body.
///
/// Serialized with a `type` tag: `text`, `image`, `file`, or the service's
/// own tag for parts this crate does not model (kept verbatim in `raw`).
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text { text: String },
    Image { file_id: String },
    File { file_id: String, filename: String },
    Other { kind: String, raw: Value },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::File { .. } => "file",
            Self::Other { kind, .. } => kind,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self, Self::Image { .. } | Self::File { .. })
    }

    pub fn file_id(&self) -> Option<&str> {
        match self {
            Self::Image { file_id } | Self::File { file_id, .. } => Some(file_id),
            _ => None,
        }
    }
}

impl Serialize for ContentPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text { text } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", text)?;
                map.end()
            }
            Self::Image { file_id } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "image")?;
                map.serialize_entry("file_id", file_id)?;
                map.end()
            }
            Self::File { file_id, filename } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "file")?;
                map.serialize_entry("file_id", file_id)?;
                map.serialize_entry("filename", filename)?;
                map.end()
            }
            Self::Other { kind, raw } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", kind)?;
                map.serialize_entry("raw", raw)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::missing_field("type"))?
            .to_string();
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let part = match kind.as_str() {
            "text" => Self::Text {
                text: field("text"),
            },
            "image" => Self::Image {
                file_id: field("file_id"),
            },
            "file" => Self::File {
                file_id: field("file_id"),
                filename: field("filename"),
            },
            _ => Self::Other {
                raw: value.get("raw").cloned().unwrap_or(Value::Null),
                kind,
            },
        };
        Ok(part)
    }
}

/// A message reshaped into role plus ordered parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub id: String,
    pub role: Role,
    pub created_at: i64,
    pub parts: Vec<ContentPart>,
}

impl NormalizedMessage {
    /// Concatenation of every text part, in order.
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(ContentPart::as_text).collect()
    }

    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(ContentPart::as_text)
    }

    pub fn attachments(&self) -> impl Iterator<Item = &ContentPart> {
        self.parts.iter().filter(|part| part.is_attachment())
    }
}

/// Body of `GET /api/threads/{id}/messages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<NormalizedMessage>,
}
