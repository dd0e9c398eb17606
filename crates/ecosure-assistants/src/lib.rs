//! ecoSure assistants - client for the hosted assistant service
//!
//! This crate provides:
//! - Thread, message, file and run operations behind the [`AssistantsApi`] trait
//! - An HTTP implementation with SSE parsing of streaming runs
//! - Normalization of upstream run events into one [`RunEvent`] vocabulary
//! - A scripted in-memory fake (feature `test-utils`)

pub mod client;
pub mod error;
pub mod events;
mod http_client;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod openai;
pub mod retry;
pub mod types;

pub use client::AssistantsApi;
pub use error::{AssistantError, Result};
pub use events::RunEvent;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockAssistants, MockOperation, MockRunStep, text_message};
pub use openai::OpenAIAssistants;
pub use retry::RetryPolicy;
pub use types::{
    Assistant, Attachment, ByteStream, FileObject, ListMessages, NewMessage, Run, SortOrder,
    Thread, ThreadMessage, UpstreamEvent, UpstreamEventStream,
};
