//! Wire contracts shared by the ecoSure relay and its clients.
//!
//! - SSE event vocabulary emitted by `POST /api/chat/stream`
//! - Normalized message shape returned by the thread listing endpoint
//! - Incremental SSE frame decoding
//! - Identifier validation

pub mod event;
pub mod ids;
pub mod message;
pub mod request;
pub mod sse;

pub use event::{ChunkPayload, DonePayload, ErrorPayload, StreamEvent};
pub use ids::{is_resource_id, is_thread_id};
pub use message::{ContentPart, MessagesResponse, NormalizedMessage, Role};
pub use request::{ChatRequest, ErrorBody, Health};
pub use sse::{SseDecoder, SseFrame};
