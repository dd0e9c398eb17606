//! Outbound side of a chat stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use ecosure_contracts::StreamEvent;
use serde_json::Value;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 64;

/// Writes events to one SSE response.
///
/// At most one terminal event (`done` or `error`) is ever written; whoever
/// flips the latch first wins and everything sent afterwards is dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Bytes>,
    terminated: Arc<AtomicBool>,
    debug: bool,
}

impl EventSink {
    pub fn channel(debug: bool) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let sink = Self {
            tx,
            terminated: Arc::new(AtomicBool::new(false)),
            debug,
        };
        (sink, rx)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// The client went away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn chunk(&self, text: &str) -> bool {
        if text.is_empty() || self.is_terminated() {
            return false;
        }
        self.write(StreamEvent::chunk(text)).await
    }

    pub async fn done(&self, thread_id: &str, message_id: Option<String>) -> bool {
        self.write_terminal(StreamEvent::done(thread_id, message_id)).await
    }

    pub async fn error(&self, message: &str) -> bool {
        let written = self.write_terminal(StreamEvent::error(message)).await;
        if !written {
            tracing::debug!(error = message, "Dropping error after terminal event");
        }
        written
    }

    /// Raw upstream event, only when debug events are enabled.
    pub async fn debug(&self, name: &str, data: &Value) -> bool {
        if !self.debug || self.is_terminated() {
            return false;
        }
        self.write(StreamEvent::debug(name, data.clone())).await
    }

    fn claim_terminal(&self) -> bool {
        self.terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claims the latch only once channel capacity is reserved, so a writer
    /// cancelled while waiting for room leaves the latch free.
    async fn write_terminal(&self, event: StreamEvent) -> bool {
        if self.is_terminated() {
            return false;
        }
        let Ok(permit) = self.tx.reserve().await else {
            tracing::debug!(event = event.name(), "Client disconnected before event");
            return false;
        };
        if !self.claim_terminal() {
            return false;
        }
        permit.send(Bytes::from(event.to_frame().encode()));
        true
    }

    async fn write(&self, event: StreamEvent) -> bool {
        let frame = event.to_frame().encode();
        if self.tx.send(Bytes::from(frame)).await.is_err() {
            tracing::debug!(event = event.name(), "Client disconnected before event");
            return false;
        }
        true
    }
}

pub fn sse_body_stream(
    mut rx: mpsc::Receiver<Bytes>,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(chunk);
        }
    }
}

pub fn sse_response<S>(stream: S) -> Response
where
    S: futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}
