//! Assistant service client trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Assistant, ByteStream, FileObject, ListMessages, NewMessage, Run, Thread, ThreadMessage,
    UpstreamEventStream,
};

/// Operations the relay needs from the hosted assistant service.
///
/// Implemented over HTTP by [`crate::OpenAIAssistants`]; tests inject a
/// scripted fake instead.
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    /// Look up an assistant; fails when the id is unknown or not accessible.
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Assistant>;

    /// Create an empty thread.
    async fn create_thread(&self) -> Result<Thread>;

    /// Upload a file for use by assistants. `filename` drives content-type
    /// inference on the service side.
    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<FileObject>;

    /// Append a message to a thread.
    async fn create_message(&self, thread_id: &str, message: NewMessage) -> Result<ThreadMessage>;

    /// Start a run and stream its raw events.
    async fn stream_run(&self, thread_id: &str, assistant_id: &str)
    -> Result<UpstreamEventStream>;

    /// Ask the service to stop an in-flight run.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// One page of a thread's messages.
    async fn list_messages(&self, thread_id: &str, query: ListMessages)
    -> Result<Vec<ThreadMessage>>;

    /// File metadata, including the original filename.
    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject>;

    /// Raw file bytes as a stream.
    async fn file_content(&self, file_id: &str) -> Result<ByteStream>;
}
