//! Scripted in-memory assistant service for relay and CLI tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use ecosure_contracts::Role;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};

use crate::client::AssistantsApi;
use crate::error::{AssistantError, Result};
use crate::types::{
    Assistant, ByteStream, FileObject, ListMessages, NewMessage, Run, SortOrder, Thread,
    ThreadMessage, UpstreamEvent, UpstreamEventStream,
};

/// What one step of a scripted run does.
#[derive(Debug, Clone)]
pub enum MockRunStepKind {
    /// Emit an upstream event.
    Event(UpstreamEvent),
    /// Break the stream with a transport error.
    Fail(String),
    /// Never produce anything again.
    Stall,
}

/// Scripted run step with optional delay.
#[derive(Debug, Clone)]
pub struct MockRunStep {
    pub delay_ms: u64,
    pub kind: MockRunStepKind,
}

impl MockRunStep {
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self {
            delay_ms: 0,
            kind: MockRunStepKind::Event(UpstreamEvent::new(name, data)),
        }
    }

    pub fn run_created(run_id: &str) -> Self {
        Self::event(
            "thread.run.created",
            json!({"id": run_id, "object": "thread.run", "status": "queued"}),
        )
    }

    pub fn text_delta(message_id: &str, text: &str) -> Self {
        Self::event(
            "thread.message.delta",
            json!({
                "id": message_id,
                "object": "thread.message.delta",
                "delta": {"content": [{"index": 0, "type": "text", "text": {"value": text}}]}
            }),
        )
    }

    pub fn message_completed(message_id: &str, text: &str) -> Self {
        Self::event(
            "thread.message.completed",
            json!({
                "id": message_id,
                "object": "thread.message",
                "role": "assistant",
                "status": "completed",
                "content": [{"type": "text", "text": {"value": text, "annotations": []}}]
            }),
        )
    }

    pub fn run_completed(run_id: &str) -> Self {
        Self::event(
            "thread.run.completed",
            json!({"id": run_id, "object": "thread.run", "status": "completed"}),
        )
    }

    pub fn run_failed(run_id: &str, message: &str) -> Self {
        Self::event(
            "thread.run.failed",
            json!({
                "id": run_id,
                "object": "thread.run",
                "status": "failed",
                "last_error": {"code": "server_error", "message": message}
            }),
        )
    }

    pub fn requires_action(run_id: &str) -> Self {
        Self::event(
            "thread.run.requires_action",
            json!({"id": run_id, "object": "thread.run", "status": "requires_action"}),
        )
    }

    pub fn error(message: &str) -> Self {
        Self::event("error", json!({"message": message}))
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockRunStepKind::Fail(message.into()),
        }
    }

    pub fn stall() -> Self {
        Self {
            delay_ms: 0,
            kind: MockRunStepKind::Stall,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// Operations that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    RetrieveAssistant,
    CreateThread,
    UploadFile,
    CreateMessage,
    StreamRun,
    CancelRun,
    ListMessages,
    RetrieveFile,
    FileContent,
}

#[derive(Debug, Default)]
struct MockState {
    assistant_id: Option<String>,
    runs: VecDeque<Vec<MockRunStep>>,
    threads: HashMap<String, Vec<ThreadMessage>>,
    files: HashMap<String, (FileObject, Vec<u8>)>,
    failures: HashMap<MockOperation, (u16, String)>,
    stalled: HashSet<MockOperation>,
    next_id: u64,
    created_threads: Vec<String>,
    posted: Vec<(String, NewMessage)>,
    uploads: Vec<(String, usize)>,
    started_runs: Vec<(String, String)>,
    cancelled: Vec<(String, String)>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn check(&self, operation: MockOperation) -> Result<()> {
        match self.failures.get(&operation) {
            Some((status, message)) => Err(AssistantError::Api {
                status: *status,
                message: message.clone(),
                retry_after_secs: None,
            }),
            None => Ok(()),
        }
    }
}

/// A deterministic assistant service driven by scripted runs.
///
/// Clones share state, so a test keeps one handle for assertions while the
/// relay owns another.
#[derive(Debug, Clone, Default)]
pub struct MockAssistants {
    state: Arc<Mutex<MockState>>,
}

impl MockAssistants {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Only this assistant id is accepted. Without one, every id is.
    pub fn with_assistant(self, assistant_id: impl Into<String>) -> Self {
        self.state().assistant_id = Some(assistant_id.into());
        self
    }

    /// Queues the script for the next `stream_run` call.
    pub fn with_run(self, steps: Vec<MockRunStep>) -> Self {
        self.state().runs.push_back(steps);
        self
    }

    pub fn with_thread(self, thread_id: impl Into<String>, messages: Vec<ThreadMessage>) -> Self {
        self.state().threads.insert(thread_id.into(), messages);
        self
    }

    pub fn with_file(
        self,
        file_id: impl Into<String>,
        filename: Option<&str>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        let file_id = file_id.into();
        let content = content.into();
        let file = FileObject {
            id: file_id.clone(),
            filename: filename.map(str::to_string),
            bytes: Some(content.len() as u64),
            purpose: Some("assistants".to_string()),
        };
        self.state().files.insert(file_id, (file, content));
        self
    }

    pub fn failing(self, operation: MockOperation, status: u16, message: &str) -> Self {
        self.state()
            .failures
            .insert(operation, (status, message.to_string()));
        self
    }

    /// The operation never completes, like an upstream that stopped answering.
    pub fn stalling(self, operation: MockOperation) -> Self {
        self.state().stalled.insert(operation);
        self
    }

    async fn gate(&self, operation: MockOperation) {
        let stalled = self.state().stalled.contains(&operation);
        if stalled {
            futures::future::pending::<()>().await;
        }
    }

    /// Appends a message to a thread after construction.
    pub fn push_message(&self, thread_id: &str, message: ThreadMessage) {
        self.state()
            .threads
            .entry(thread_id.to_string())
            .or_default()
            .push(message);
    }

    pub fn created_threads(&self) -> Vec<String> {
        self.state().created_threads.clone()
    }

    pub fn posted_messages(&self) -> Vec<(String, NewMessage)> {
        self.state().posted.clone()
    }

    /// Filename and size of every upload, in order.
    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.state().uploads.clone()
    }

    /// Thread and assistant of every run started.
    pub fn started_runs(&self) -> Vec<(String, String)> {
        self.state().started_runs.clone()
    }

    pub fn cancelled_runs(&self) -> Vec<(String, String)> {
        self.state().cancelled.clone()
    }
}

/// A stored message with a single text part.
pub fn text_message(id: &str, role: Role, text: &str, created_at: i64) -> ThreadMessage {
    ThreadMessage {
        id: id.to_string(),
        thread_id: None,
        role,
        created_at: Some(created_at),
        content: vec![json!({"type": "text", "text": {"value": text, "annotations": []}})],
    }
}

#[async_trait]
impl AssistantsApi for MockAssistants {
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        self.gate(MockOperation::RetrieveAssistant).await;
        let state = self.state();
        state.check(MockOperation::RetrieveAssistant)?;
        match &state.assistant_id {
            Some(known) if known != assistant_id => Err(AssistantError::Api {
                status: 404,
                message: format!("No assistant found with id '{assistant_id}'."),
                retry_after_secs: None,
            }),
            _ => Ok(Assistant {
                id: assistant_id.to_string(),
                name: Some("mock".to_string()),
                model: Some("mock-model".to_string()),
            }),
        }
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.gate(MockOperation::CreateThread).await;
        let mut state = self.state();
        state.check(MockOperation::CreateThread)?;
        let id = state.next_id("thread_mock");
        state.threads.insert(id.clone(), Vec::new());
        state.created_threads.push(id.clone());
        Ok(Thread { id })
    }

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<FileObject> {
        self.gate(MockOperation::UploadFile).await;
        let mut state = self.state();
        state.check(MockOperation::UploadFile)?;
        let id = state.next_id("file-mock");
        let file = FileObject {
            id: id.clone(),
            filename: Some(filename.to_string()),
            bytes: Some(bytes.len() as u64),
            purpose: Some("assistants".to_string()),
        };
        state.uploads.push((filename.to_string(), bytes.len()));
        state.files.insert(id, (file.clone(), bytes));
        Ok(file)
    }

    async fn create_message(&self, thread_id: &str, message: NewMessage) -> Result<ThreadMessage> {
        self.gate(MockOperation::CreateMessage).await;
        let mut state = self.state();
        state.check(MockOperation::CreateMessage)?;
        let id = state.next_id("msg_mock");
        let mut stored = text_message(&id, message.role, &message.content, state.next_id as i64);
        stored.thread_id = Some(thread_id.to_string());
        state
            .threads
            .entry(thread_id.to_string())
            .or_default()
            .push(stored.clone());
        state.posted.push((thread_id.to_string(), message));
        Ok(stored)
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<UpstreamEventStream> {
        self.gate(MockOperation::StreamRun).await;
        let steps = {
            let mut state = self.state();
            state.check(MockOperation::StreamRun)?;
            state
                .started_runs
                .push((thread_id.to_string(), assistant_id.to_string()));
            state.runs.pop_front().unwrap_or_else(|| {
                vec![
                    MockRunStep::run_created("run_mock"),
                    MockRunStep::run_completed("run_mock"),
                ]
            })
        };

        Ok(Box::pin(async_stream::stream! {
            for step in steps {
                if step.delay_ms > 0 {
                    sleep(Duration::from_millis(step.delay_ms)).await;
                }
                match step.kind {
                    MockRunStepKind::Event(event) => yield Ok(event),
                    MockRunStepKind::Fail(message) => {
                        yield Err(AssistantError::Stream(message));
                        return;
                    }
                    MockRunStepKind::Stall => futures::future::pending::<()>().await,
                }
            }
        }))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.gate(MockOperation::CancelRun).await;
        let mut state = self.state();
        state.check(MockOperation::CancelRun)?;
        state
            .cancelled
            .push((thread_id.to_string(), run_id.to_string()));
        Ok(Run {
            id: run_id.to_string(),
            thread_id: Some(thread_id.to_string()),
            status: "cancelling".to_string(),
            last_error: None,
            incomplete_details: None,
        })
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        query: ListMessages,
    ) -> Result<Vec<ThreadMessage>> {
        self.gate(MockOperation::ListMessages).await;
        let state = self.state();
        state.check(MockOperation::ListMessages)?;
        let messages = state
            .threads
            .get(thread_id)
            .ok_or_else(|| AssistantError::Api {
                status: 404,
                message: format!("No thread found with id '{thread_id}'."),
                retry_after_secs: None,
            })?;

        let limit = query.limit as usize;
        let page = match query.order {
            SortOrder::Asc => messages.iter().take(limit).cloned().collect(),
            SortOrder::Desc => messages.iter().rev().take(limit).cloned().collect(),
        };
        Ok(page)
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject> {
        self.gate(MockOperation::RetrieveFile).await;
        let state = self.state();
        state.check(MockOperation::RetrieveFile)?;
        state
            .files
            .get(file_id)
            .map(|(file, _)| file.clone())
            .ok_or_else(|| AssistantError::NotFound(file_id.to_string()))
    }

    async fn file_content(&self, file_id: &str) -> Result<ByteStream> {
        self.gate(MockOperation::FileContent).await;
        let content = {
            let state = self.state();
            state.check(MockOperation::FileContent)?;
            state
                .files
                .get(file_id)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| AssistantError::NotFound(file_id.to_string()))?
        };

        // Two chunks so consumers see a real stream.
        let mid = content.len() / 2;
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&content[..mid])),
            Ok(Bytes::copy_from_slice(&content[mid..])),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
