//! Conversation state and the streamed turn loop.
//!
//! A turn echoes the user's text locally, accumulates streamed fragments in
//! a provisional assistant message and, once the relay reports `done`,
//! replaces everything with the thread listing. The listing is the source of
//! truth; the accumulator only exists so text can be shown while it arrives.

use std::time::Instant;

use ecosure_contracts::{
    ContentPart, DonePayload, NormalizedMessage, Role, SseDecoder, StreamEvent, is_thread_id,
};
use futures::StreamExt;
use thiserror::Error;

use crate::client::{Attachment, RelayTransport, Turn};
use crate::output::progress::ELLIPSIS_TIMEOUT;

const PENDING_USER_ID: &str = "pending-user";
const PENDING_ASSISTANT_ID: &str = "pending-assistant";
const CLOSED_EARLY: &str = "Connection closed before the assistant finished.";

/// Why a send was not even attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendRefused {
    #[error("Provide a message or at least one file.")]
    Empty,
    #[error("A turn is already in progress.")]
    Busy,
}

/// What one stream event did to the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Chunk(String),
    Done {
        thread_id: Option<String>,
        message_id: Option<String>,
    },
    Failed(String),
    Ignored,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Done {
        thread_id: Option<String>,
        message_id: Option<String>,
    },
    Failed(String),
}

#[derive(Debug, Default)]
pub struct Conversation {
    thread_id: Option<String>,
    messages: Vec<NormalizedMessage>,
    draft: Option<String>,
    loading: bool,
    streaming: bool,
    ellipsis_since: Option<Instant>,
    error: Option<String>,
}

impl Conversation {
    pub fn new(thread_id: Option<String>) -> Self {
        Self {
            thread_id,
            ..Default::default()
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn messages(&self) -> &[NormalizedMessage] {
        &self.messages
    }

    /// Text streamed so far for the in-flight answer.
    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn ellipsis_visible(&self, now: Instant) -> bool {
        self.ellipsis_since
            .is_some_and(|since| now.saturating_duration_since(since) < ELLIPSIS_TIMEOUT)
    }

    /// The thread id to send, if the held one looks like a real thread.
    pub fn outgoing_thread_id(&self) -> Option<String> {
        self.thread_id.clone().filter(|id| is_thread_id(id))
    }

    pub fn check_send(&self, message: &str, file_count: usize) -> Result<(), SendRefused> {
        if self.loading {
            return Err(SendRefused::Busy);
        }
        if message.trim().is_empty() && file_count == 0 {
            return Err(SendRefused::Empty);
        }
        Ok(())
    }

    pub fn begin_turn(&mut self, message: &str, files: &[Attachment], now: Instant) {
        let mut parts = Vec::new();
        if !message.trim().is_empty() {
            parts.push(ContentPart::text(message));
        }
        parts.extend(files.iter().map(|file| ContentPart::File {
            file_id: String::new(),
            filename: file.filename.clone(),
        }));
        self.messages.push(NormalizedMessage {
            id: PENDING_USER_ID.to_string(),
            role: Role::User,
            created_at: chrono::Utc::now().timestamp(),
            parts,
        });

        self.draft = Some(String::new());
        self.loading = true;
        self.streaming = false;
        self.ellipsis_since = Some(now);
        self.error = None;
    }

    pub fn apply(&mut self, event: &StreamEvent) -> Step {
        match event {
            StreamEvent::Chunk(payload) => {
                if payload.text.is_empty() {
                    return Step::Ignored;
                }
                self.streaming = true;
                self.ellipsis_since = None;
                self.draft
                    .get_or_insert_with(String::new)
                    .push_str(&payload.text);
                Step::Chunk(payload.text.clone())
            }
            StreamEvent::Done(DonePayload {
                thread_id,
                message_id,
            }) => {
                if let Some(id) = thread_id.as_ref().filter(|id| !id.is_empty()) {
                    if self.thread_id.as_ref() != Some(id) {
                        tracing::debug!(thread_id = %id, "Adopting thread");
                        self.thread_id = Some(id.clone());
                    }
                }
                self.loading = false;
                self.streaming = false;
                Step::Done {
                    thread_id: self.thread_id.clone(),
                    message_id: message_id.clone(),
                }
            }
            StreamEvent::Error(payload) => {
                let message = payload
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string());
                self.fail(message.clone());
                Step::Failed(message)
            }
            StreamEvent::Debug { event, .. } => {
                tracing::trace!(event = %event, "Relay debug event");
                Step::Ignored
            }
        }
    }

    /// Replaces local messages with the listing and drops the accumulator.
    pub fn reconcile(&mut self, messages: Vec<NormalizedMessage>) {
        self.messages = messages;
        self.draft = None;
        self.loading = false;
        self.streaming = false;
    }

    /// The listing could not be fetched: keep the streamed text as the answer.
    pub fn keep_draft(&mut self) {
        if let Some(text) = self.draft.take().filter(|text| !text.is_empty()) {
            self.messages.push(NormalizedMessage {
                id: PENDING_ASSISTANT_ID.to_string(),
                role: Role::Assistant,
                created_at: chrono::Utc::now().timestamp(),
                parts: vec![ContentPart::text(text)],
            });
        }
        self.loading = false;
        self.streaming = false;
    }

    pub fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.draft = None;
        self.loading = false;
        self.streaming = false;
        self.ellipsis_since = None;
    }

    /// Starts a new analysis.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn latest_assistant(&self) -> Option<&NormalizedMessage> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
    }
}

/// Sends one turn and drives it to its end. `on_step` sees every event as
/// it is applied, before reconciliation.
pub async fn send_turn<F>(
    transport: &dyn RelayTransport,
    convo: &mut Conversation,
    message: String,
    files: Vec<Attachment>,
    mut on_step: F,
) -> Result<TurnOutcome, SendRefused>
where
    F: FnMut(&Step, &Conversation),
{
    convo.check_send(&message, files.len())?;
    convo.begin_turn(&message, &files, Instant::now());

    let turn = Turn {
        message,
        thread_id: convo.outgoing_thread_id(),
        files,
    };

    let mut body = match transport.open_chat(&turn).await {
        Ok(body) => body,
        Err(err) => return Ok(fail(convo, format!("Network error: {err}"), &mut on_step)),
    };

    let mut decoder = SseDecoder::new();
    let mut terminal = None;

    'read: while let Some(bytes) = body.next().await {
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(err) => return Ok(fail(convo, format!("Network error: {err}"), &mut on_step)),
        };
        for frame in decoder.push(&bytes) {
            if let Some(step) = apply_frame(convo, &frame, &mut on_step) {
                terminal = Some(step);
                break 'read;
            }
        }
    }
    if terminal.is_none() {
        if let Some(frame) = decoder.finish() {
            terminal = apply_frame(convo, &frame, &mut on_step);
        }
    }

    match terminal {
        Some(Step::Done {
            thread_id,
            message_id,
        }) => {
            refresh(transport, convo, thread_id.as_deref()).await;
            Ok(TurnOutcome::Done {
                thread_id,
                message_id,
            })
        }
        Some(Step::Failed(message)) => Ok(TurnOutcome::Failed(message)),
        _ => Ok(fail(convo, CLOSED_EARLY.to_string(), &mut on_step)),
    }
}

fn apply_frame<F>(
    convo: &mut Conversation,
    frame: &ecosure_contracts::SseFrame,
    on_step: &mut F,
) -> Option<Step>
where
    F: FnMut(&Step, &Conversation),
{
    let event = StreamEvent::from_frame(frame)?;
    let step = convo.apply(&event);
    on_step(&step, convo);
    matches!(step, Step::Done { .. } | Step::Failed(_)).then_some(step)
}

fn fail<F>(convo: &mut Conversation, message: String, on_step: &mut F) -> TurnOutcome
where
    F: FnMut(&Step, &Conversation),
{
    convo.fail(message.clone());
    on_step(&Step::Failed(message.clone()), convo);
    TurnOutcome::Failed(message)
}

async fn refresh(transport: &dyn RelayTransport, convo: &mut Conversation, thread_id: Option<&str>) {
    let Some(thread_id) = thread_id else {
        convo.keep_draft();
        return;
    };
    match transport.thread_messages(thread_id).await {
        Ok(messages) => convo.reconcile(messages),
        Err(err) => {
            tracing::warn!(thread_id, error = %err, "Failed to refresh thread after done");
            convo.keep_draft();
        }
    }
}
