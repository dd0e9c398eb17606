//! One chat turn: upstream calls in, SSE events out.
//!
//! A turn validates its input and configuration, resolves the thread,
//! uploads attachments, posts the user message and then translates the
//! run's event stream into `chunk` events followed by exactly one `done` or
//! `error`. The whole pipeline races a wall-clock deadline; when the deadline
//! wins the run is cancelled upstream.

pub mod sink;
pub mod uploads;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ecosure_assistants::{
    AssistantsApi, Attachment, ListMessages, NewMessage, RunEvent, ThreadMessage,
};
use ecosure_contracts::Role;
use futures::StreamExt;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::error::RelayError;

pub use sink::EventSink;
pub use uploads::StagedUpload;

/// Prompt sent when the user attached files without writing anything.
pub const DEFAULT_FILE_PROMPT: &str =
    "Please analyze the attached file(s) and summarize key insights.";

/// Upper bound on a background cancel request.
const CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed body of a chat request.
#[derive(Debug, Default)]
pub struct ChatInput {
    pub message: String,
    pub thread_id: Option<String>,
    pub files: Vec<StagedUpload>,
}

impl ChatInput {
    fn is_empty(&self) -> bool {
        self.message.trim().is_empty() && self.files.is_empty()
    }
}

/// Upstream ids learned while the turn runs, kept outside the pipeline
/// future so the timeout path can still see them.
#[derive(Debug, Default)]
struct RunTracker {
    thread_id: OnceLock<String>,
    run_id: OnceLock<String>,
}

pub struct Relay {
    assistants: Arc<dyn AssistantsApi>,
    config: Arc<ServerConfig>,
}

impl Relay {
    pub fn new(assistants: Arc<dyn AssistantsApi>, config: Arc<ServerConfig>) -> Self {
        Self { assistants, config }
    }

    /// Runs one turn to its terminal event.
    pub async fn run(&self, input: ChatInput, sink: &EventSink) {
        let tracker = RunTracker::default();

        let outcome = tokio::select! {
            result = self.drive(input, sink, &tracker) => result,
            _ = tokio::time::sleep(self.config.stream_timeout) => Err(RelayError::Timeout),
        };

        let Err(err) = outcome else {
            return;
        };

        match &err {
            RelayError::Timeout => {
                tracing::warn!(
                    timeout_ms = self.config.stream_timeout.as_millis() as u64,
                    "Chat stream timed out"
                );
            }
            err if err.is_precondition() => {
                tracing::info!(error = %err, "Chat request rejected");
            }
            err => tracing::error!(error = %err, "Chat turn failed"),
        }
        // The client hears about the failure before any upstream cleanup.
        sink.error(&err.to_string()).await;
        if matches!(err, RelayError::Timeout | RelayError::RequiresAction) {
            self.spawn_cancel(&tracker);
        }
    }

    async fn drive(
        &self,
        input: ChatInput,
        sink: &EventSink,
        tracker: &RunTracker,
    ) -> Result<(), RelayError> {
        if input.is_empty() {
            return Err(RelayError::EmptyInput);
        }
        let assistant_id = self
            .config
            .assistant_id
            .as_deref()
            .ok_or(RelayError::MissingAssistantId)?;
        if self.config.api_key.is_none() {
            return Err(RelayError::MissingApiKey);
        }

        if let Err(err) = self.assistants.retrieve_assistant(assistant_id).await {
            tracing::warn!(assistant_id, error = %err, "Assistant lookup failed");
            return Err(RelayError::InvalidAssistant);
        }

        let thread_id = match input.thread_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => {
                let thread = self.assistants.create_thread().await?;
                tracing::debug!(thread_id = %thread.id, "Created thread");
                thread.id
            }
        };
        let thread_id = tracker.thread_id.get_or_init(|| thread_id).as_str();

        let mut attachments = Vec::with_capacity(input.files.len());
        for staged in input.files {
            let (filename, bytes) = staged.take().await?;
            let size = bytes.len();
            let file = self.assistants.upload_file(&filename, bytes).await?;
            tracing::debug!(file_id = %file.id, filename, size, "Uploaded attachment");
            attachments.push(Attachment::file_search(file.id));
        }

        let message = input.message.trim();
        let content = if message.is_empty() {
            DEFAULT_FILE_PROMPT
        } else {
            message
        };
        self.assistants
            .create_message(
                thread_id,
                NewMessage::user(content).with_attachments(attachments),
            )
            .await?;

        let mut events = self.assistants.stream_run(thread_id, assistant_id).await?;
        let mut streamed = String::new();
        let mut last_message_id = None;

        while let Some(event) = events.next().await {
            if sink.is_closed() {
                tracing::info!(thread_id, "Client disconnected, abandoning run");
                self.spawn_cancel(tracker);
                return Ok(());
            }

            let event = event?;
            sink.debug(&event.name, &event.data).await;

            match RunEvent::from(&event) {
                RunEvent::RunCreated(run) => {
                    tracing::debug!(run_id = %run.id, "Run started");
                    let _ = tracker.run_id.set(run.id);
                }
                RunEvent::TextDelta { message_id, text } => {
                    if message_id.is_some() {
                        last_message_id = message_id;
                    }
                    streamed.push_str(&text);
                    sink.chunk(&text).await;
                }
                RunEvent::MessageCompleted(message) => {
                    let full = message.text();
                    sink.chunk(unsent_suffix(&full, &streamed)).await;
                    sink.done(thread_id, Some(message.id)).await;
                    return Ok(());
                }
                RunEvent::RunCompleted(run) if run.is_completed() => {
                    if streamed.is_empty() {
                        return self.fallback(thread_id, sink).await;
                    }
                    sink.done(thread_id, last_message_id).await;
                    return Ok(());
                }
                RunEvent::RunCompleted(run) => {
                    return Err(RelayError::RunIncomplete {
                        reason: run.failure_reason(),
                        status: run.status,
                    });
                }
                RunEvent::RequiresAction(run) => {
                    let _ = tracker.run_id.set(run.id);
                    return Err(RelayError::RequiresAction);
                }
                RunEvent::Error(message) => return Err(RelayError::Stream(message)),
                RunEvent::Unknown { name } => {
                    tracing::trace!(event = %name, "Ignoring upstream event");
                }
            }
        }

        tracing::debug!(thread_id, "Run stream ended without a terminal event");
        if streamed.is_empty() {
            return self.fallback(thread_id, sink).await;
        }
        sink.done(thread_id, last_message_id).await;
        Ok(())
    }

    /// Nothing was streamed: read back the newest assistant message.
    ///
    /// Best effort. The listing may not yet reflect the run that just ended.
    async fn fallback(&self, thread_id: &str, sink: &EventSink) -> Result<(), RelayError> {
        tracing::warn!(thread_id, "No text streamed, reading latest messages");

        let messages = match self
            .assistants
            .list_messages(thread_id, ListMessages::latest())
            .await
        {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(thread_id, error = %err, "Fallback read failed");
                sink.done(thread_id, None).await;
                return Ok(());
            }
        };

        let Some(message) = latest_assistant_message(&messages) else {
            return Err(RelayError::NoOutput);
        };
        if let Some(text) = message.text_parts().next() {
            sink.chunk(text).await;
        }
        sink.done(thread_id, Some(message.id.clone())).await;
        Ok(())
    }

    /// Cancels the run in the background. Nothing waits on the result.
    fn spawn_cancel(&self, tracker: &RunTracker) {
        let (Some(thread_id), Some(run_id)) =
            (tracker.thread_id.get().cloned(), tracker.run_id.get().cloned())
        else {
            return;
        };
        let assistants = Arc::clone(&self.assistants);
        tokio::spawn(
            async move {
                let cancel = assistants.cancel_run(&thread_id, &run_id);
                match tokio::time::timeout(CANCEL_TIMEOUT, cancel).await {
                    Ok(Ok(_)) => tracing::info!(%thread_id, %run_id, "Cancelled run"),
                    Ok(Err(err)) => {
                        tracing::warn!(%thread_id, %run_id, error = %err, "Failed to cancel run");
                    }
                    Err(_) => tracing::warn!(%thread_id, %run_id, "Cancel request timed out"),
                }
            }
            .in_current_span(),
        );
    }
}

fn latest_assistant_message(messages: &[ThreadMessage]) -> Option<&ThreadMessage> {
    messages.iter().find(|message| message.role == Role::Assistant)
}

/// The part of `full` not yet sent as deltas. When the streamed text is not
/// a prefix of the final text nothing is resent; the client reconciles from
/// the listing.
fn unsent_suffix<'a>(full: &'a str, streamed: &str) -> &'a str {
    if streamed.is_empty() {
        return full;
    }
    full.strip_prefix(streamed).unwrap_or_default()
}
