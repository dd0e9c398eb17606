//! Router-level tests of the relay against a scripted assistant service

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use ecosure_assistants::mock::{MockOperation, MockRunStep, text_message};
use ecosure_assistants::MockAssistants;
use ecosure_contracts::{
    ContentPart, MessagesResponse, Role, SseDecoder, StreamEvent, is_thread_id,
};
use ecosure_server::relay::DEFAULT_FILE_PROMPT;
use ecosure_server::{AppState, ServerConfig, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "ecosure-test-boundary";

fn config() -> ServerConfig {
    ServerConfig {
        api_key: Some("sk-test".to_string()),
        assistant_id: Some("asst_test".to_string()),
        stream_timeout: Duration::from_secs(5),
        ..ServerConfig::default()
    }
}

fn app(mock: &MockAssistants, config: ServerConfig) -> Router {
    build_router(AppState::new(config, Arc::new(mock.clone())))
}

fn json_request(body: Value) -> Request<Body> {
    Request::post("/api/chat/stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

enum Part<'a> {
    Field(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Field(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(filename, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/chat/stream")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn stream_events(app: Router, request: Request<Body>) -> Vec<StreamEvent> {
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
    assert!(
        response.headers()[header::CACHE_CONTROL]
            .to_str()
            .unwrap()
            .contains("no-cache")
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let mut decoder = SseDecoder::new();
    let mut events: Vec<StreamEvent> = decoder
        .push(&bytes)
        .iter()
        .filter_map(StreamEvent::from_frame)
        .collect();
    if let Some(frame) = decoder.finish() {
        events.extend(StreamEvent::from_frame(&frame));
    }
    events
}

fn chunks(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Chunk(chunk) => Some(chunk.text.clone()),
            _ => None,
        })
        .collect()
}

/// The single terminal event, asserting it is last and unique.
fn terminal(events: &[StreamEvent]) -> &StreamEvent {
    let terminals: Vec<_> = events.iter().filter(|event| event.is_terminal()).collect();
    assert_eq!(terminals.len(), 1, "expected one terminal event in {events:?}");
    let last = events.last().unwrap();
    assert!(last.is_terminal(), "terminal event must be last: {events:?}");
    last
}

fn error_text(events: &[StreamEvent]) -> String {
    match terminal(events) {
        StreamEvent::Error(payload) => payload.error.clone().unwrap_or_default(),
        other => panic!("expected error, got {other:?}"),
    }
}

/// Cancellation runs detached from the stream; give it a moment to land.
async fn cancelled_runs(mock: &MockAssistants) -> Vec<(String, String)> {
    for _ in 0..100 {
        let cancelled = mock.cancelled_runs();
        if !cancelled.is_empty() {
            return cancelled;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    mock.cancelled_runs()
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_empty_input_yields_single_error() {
    let mock = MockAssistants::new();
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "   "}))).await;

    assert_eq!(events.len(), 1);
    assert_eq!(error_text(&events), "Provide a message or at least one file.");
    assert!(mock.created_threads().is_empty());
}

#[tokio::test]
async fn test_scenario_a_text_question_streams_then_done() {
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::run_created("run_1"),
        MockRunStep::text_delta("msg_1", "You need a "),
        MockRunStep::text_delta("msg_1", "clearing permit."),
        MockRunStep::message_completed("msg_1", "You need a clearing permit."),
        MockRunStep::run_completed("run_1"),
    ]);

    let events = stream_events(
        app(&mock, config()),
        json_request(json!({
            "message": "What permits do I need to clear 2 hectares of native vegetation?"
        })),
    )
    .await;

    assert_eq!(chunks(&events), vec!["You need a ", "clearing permit."]);
    match terminal(&events) {
        StreamEvent::Done(done) => {
            let thread_id = done.thread_id.as_deref().unwrap();
            assert!(is_thread_id(thread_id));
            assert_eq!(done.message_id.as_deref(), Some("msg_1"));
        }
        other => panic!("expected done, got {other:?}"),
    }

    let posted = mock.posted_messages();
    assert_eq!(posted.len(), 1);
    assert_eq!(
        posted[0].1.content,
        "What permits do I need to clear 2 hectares of native vegetation?"
    );
    assert!(posted[0].1.attachments.is_empty());
}

#[tokio::test]
async fn test_scenario_b_file_only_uses_default_prompt_and_cleans_up() {
    let uploads = tempfile::tempdir().unwrap();
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::text_delta("msg_1", "The photo shows a wetland."),
        MockRunStep::run_completed("run_1"),
    ]);
    let config = ServerConfig {
        upload_dir: Some(uploads.path().to_path_buf()),
        ..config()
    };

    let events = stream_events(
        app(&mock, config),
        multipart_request(&[
            Part::Field("message", ""),
            Part::File("site.png", "image/png", b"\x89PNG\r\n\x1a\nfake"),
        ]),
    )
    .await;

    assert!(matches!(terminal(&events), StreamEvent::Done(_)));
    assert_eq!(mock.uploads(), vec![("site.png".to_string(), 12)]);

    let posted = mock.posted_messages();
    assert_eq!(posted[0].1.content, DEFAULT_FILE_PROMPT);
    assert_eq!(posted[0].1.attachments.len(), 1);
    assert_eq!(posted[0].1.attachments[0].tools[0].kind, "file_search");
    assert!(dir_is_empty(uploads.path()));
}

#[tokio::test]
async fn test_scenario_c_invalid_assistant_fails_before_thread() {
    let mock = MockAssistants::new().with_assistant("asst_other");
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))).await;

    assert_eq!(events.len(), 1);
    assert_eq!(
        error_text(&events),
        "Invalid ASSISTANT_ID or not accessible with this API key."
    );
    assert!(mock.created_threads().is_empty());
    assert!(mock.posted_messages().is_empty());
}

#[tokio::test]
async fn test_scenario_d_failed_run_reports_status() {
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::run_created("run_1"),
        MockRunStep::run_failed("run_1", "Rate limit reached"),
    ]);
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))).await;

    let text = error_text(&events);
    assert!(text.contains("failed"));
    assert_eq!(text, "Run status: failed. Rate limit reached");
}

#[tokio::test]
async fn test_missing_configuration_is_reported() {
    let mock = MockAssistants::new();

    let no_assistant = ServerConfig {
        assistant_id: None,
        ..config()
    };
    let events = stream_events(app(&mock, no_assistant), json_request(json!({"message": "hi"}))).await;
    assert_eq!(error_text(&events), "Server not configured with ASSISTANT_ID");

    let no_key = ServerConfig {
        api_key: None,
        ..config()
    };
    let events = stream_events(app(&mock, no_key), json_request(json!({"message": "hi"}))).await;
    assert_eq!(error_text(&events), "Server not configured with OPENAI_API_KEY");
    assert!(mock.created_threads().is_empty());
}

#[tokio::test]
async fn test_timeout_emits_one_error_and_cancels_run() {
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::run_created("run_slow"),
        MockRunStep::text_delta("msg_1", "Thinking"),
        MockRunStep::stall(),
    ]);
    let config = ServerConfig {
        stream_timeout: Duration::from_millis(100),
        ..config()
    };

    let events = stream_events(
        app(&mock, config),
        json_request(json!({"message": "hi", "threadId": "thread_abc"})),
    )
    .await;

    assert_eq!(chunks(&events), vec!["Thinking"]);
    assert_eq!(error_text(&events), "Stream timeout");
    assert_eq!(
        cancelled_runs(&mock).await,
        vec![("thread_abc".to_string(), "run_slow".to_string())]
    );
}

#[tokio::test]
async fn test_timeout_closes_stream_even_when_cancel_hangs() {
    let mock = MockAssistants::new()
        .stalling(MockOperation::CancelRun)
        .with_run(vec![
            MockRunStep::run_created("run_slow"),
            MockRunStep::text_delta("msg_1", "Hel"),
            MockRunStep::stall(),
        ]);
    let config = ServerConfig {
        stream_timeout: Duration::from_millis(200),
        ..config()
    };

    let events = tokio::time::timeout(
        Duration::from_secs(3),
        stream_events(app(&mock, config), json_request(json!({"message": "hi"}))),
    )
    .await
    .expect("stream should close once the timeout error is sent");

    assert_eq!(chunks(&events), vec!["Hel"]);
    assert_eq!(error_text(&events), "Stream timeout");
}

#[tokio::test]
async fn test_requires_action_closes_stream_even_when_cancel_hangs() {
    let mock = MockAssistants::new()
        .stalling(MockOperation::CancelRun)
        .with_run(vec![
            MockRunStep::run_created("run_1"),
            MockRunStep::requires_action("run_1"),
        ]);

    let events = tokio::time::timeout(
        Duration::from_secs(3),
        stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))),
    )
    .await
    .expect("stream should close without waiting on the cancel");

    assert_eq!(
        error_text(&events),
        "Assistant requires action which is not implemented on server."
    );
}

#[tokio::test]
async fn test_stream_ending_after_text_sends_done_with_last_message() {
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::text_delta("msg_7", "Native vegetation "),
        MockRunStep::text_delta("msg_7", "needs a permit."),
    ]);
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))).await;

    assert_eq!(chunks(&events), vec!["Native vegetation ", "needs a permit."]);
    match terminal(&events) {
        StreamEvent::Done(done) => {
            assert_eq!(done.message_id.as_deref(), Some("msg_7"));
            assert!(is_thread_id(done.thread_id.as_deref().unwrap()));
        }
        other => panic!("expected done, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fallback_listing_failure_still_sends_done() {
    let mock = MockAssistants::new()
        .failing(MockOperation::ListMessages, 500, "listing unavailable")
        .with_run(vec![
            MockRunStep::run_created("run_1"),
            MockRunStep::run_completed("run_1"),
        ]);
    let events = stream_events(
        app(&mock, config()),
        json_request(json!({"message": "hi", "threadId": "thread_abc"})),
    )
    .await;

    assert!(chunks(&events).is_empty());
    match terminal(&events) {
        StreamEvent::Done(done) => {
            assert_eq!(done.thread_id.as_deref(), Some("thread_abc"));
            assert_eq!(done.message_id, None);
        }
        other => panic!("expected done, got {other:?}"),
    }
}

#[tokio::test]
async fn test_completed_message_sends_only_unstreamed_suffix() {
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::text_delta("msg_1", "Hel"),
        MockRunStep::message_completed("msg_1", "Hello"),
        MockRunStep::run_completed("run_1"),
    ]);
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))).await;

    assert_eq!(chunks(&events), vec!["Hel", "lo"]);
    assert!(matches!(terminal(&events), StreamEvent::Done(_)));
}

#[tokio::test]
async fn test_completion_without_deltas_forwards_full_text() {
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::run_created("run_1"),
        MockRunStep::message_completed("msg_9", "Whole answer"),
    ]);
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))).await;

    assert_eq!(chunks(&events), vec!["Whole answer"]);
    match terminal(&events) {
        StreamEvent::Done(done) => assert_eq!(done.message_id.as_deref(), Some("msg_9")),
        other => panic!("expected done, got {other:?}"),
    }
}

#[tokio::test]
async fn test_textless_run_falls_back_to_latest_assistant_message() {
    let mock = MockAssistants::new()
        .with_thread(
            "thread_known",
            vec![text_message("msg_prev", Role::Assistant, "Recovered answer", 1)],
        )
        .with_run(vec![
            MockRunStep::run_created("run_1"),
            MockRunStep::run_completed("run_1"),
        ]);

    let events = stream_events(
        app(&mock, config()),
        json_request(json!({"message": "hi", "threadId": "thread_known"})),
    )
    .await;

    assert_eq!(chunks(&events), vec!["Recovered answer"]);
    match terminal(&events) {
        StreamEvent::Done(done) => {
            assert_eq!(done.thread_id.as_deref(), Some("thread_known"));
            assert_eq!(done.message_id.as_deref(), Some("msg_prev"));
        }
        other => panic!("expected done, got {other:?}"),
    }
    assert!(mock.created_threads().is_empty());
}

#[tokio::test]
async fn test_textless_run_without_assistant_message_is_an_error() {
    let mock = MockAssistants::new().with_run(vec![MockRunStep::run_completed("run_1")]);
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))).await;

    assert!(chunks(&events).is_empty());
    assert!(error_text(&events).starts_with("No assistant output was produced for this run."));
}

#[tokio::test]
async fn test_requires_action_is_an_error() {
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::run_created("run_1"),
        MockRunStep::requires_action("run_1"),
    ]);
    let events = stream_events(
        app(&mock, config()),
        json_request(json!({"message": "hi", "threadId": "thread_abc"})),
    )
    .await;

    assert_eq!(
        error_text(&events),
        "Assistant requires action which is not implemented on server."
    );
    assert_eq!(cancelled_runs(&mock).await.len(), 1);
}

#[tokio::test]
async fn test_upstream_failures_become_error_events() {
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::text_delta("msg_1", "Partial"),
        MockRunStep::error("Server overloaded"),
    ]);
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))).await;
    assert_eq!(chunks(&events), vec!["Partial"]);
    assert_eq!(error_text(&events), "Server overloaded");

    let mock = MockAssistants::new().with_run(vec![MockRunStep::fail("connection reset")]);
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))).await;
    assert_eq!(error_text(&events), "Stream error: connection reset");

    let mock =
        MockAssistants::new().failing(MockOperation::CreateMessage, 400, "Thread is locked");
    let events = stream_events(app(&mock, config()), json_request(json!({"message": "hi"}))).await;
    assert_eq!(error_text(&events), "Thread is locked");
}

#[tokio::test]
async fn test_failed_upload_still_removes_staged_files() {
    let uploads = tempfile::tempdir().unwrap();
    let mock = MockAssistants::new().failing(MockOperation::UploadFile, 400, "Unsupported file");
    let config = ServerConfig {
        upload_dir: Some(uploads.path().to_path_buf()),
        ..config()
    };

    let events = stream_events(
        app(&mock, config),
        multipart_request(&[
            Part::Field("message", "check these"),
            Part::File("a.csv", "text/csv", b"a,b\n1,2\n"),
            Part::File("b.csv", "text/csv", b"c,d\n3,4\n"),
        ]),
    )
    .await;

    assert_eq!(error_text(&events), "Unsupported file");
    assert!(mock.posted_messages().is_empty());
    assert!(dir_is_empty(uploads.path()));
}

#[tokio::test]
async fn test_malformed_body_is_an_error_event() {
    let mock = MockAssistants::new();
    let request = Request::post("/api/chat/stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let events = stream_events(app(&mock, config()), request).await;
    assert!(error_text(&events).starts_with("Invalid JSON body"));
}

#[tokio::test]
async fn test_debug_events_forwarded_when_enabled() {
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::run_created("run_1"),
        MockRunStep::text_delta("msg_1", "Hi"),
        MockRunStep::run_completed("run_1"),
    ]);
    let config = ServerConfig {
        debug_sse: true,
        ..config()
    };

    let events = stream_events(app(&mock, config), json_request(json!({"message": "hi"}))).await;
    let debug_names: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Debug { event, .. } => Some(event.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        debug_names,
        vec!["thread.run.created", "thread.message.delta", "thread.run.completed"]
    );
    assert!(matches!(terminal(&events), StreamEvent::Done(_)));
}

#[tokio::test]
async fn test_listing_normalizes_in_order() {
    let mut with_image = text_message("msg_2", Role::Assistant, "See map", 2);
    with_image
        .content
        .push(json!({"type": "image_file", "image_file": {"file_id": "file-map"}}));
    let mock = MockAssistants::new().with_thread(
        "thread_abc",
        vec![text_message("msg_1", Role::User, "Where?", 1), with_image],
    );

    let response = app(&mock, config())
        .oneshot(
            Request::get("/api/threads/thread_abc/messages")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let listing: MessagesResponse = serde_json::from_slice(&bytes).unwrap();
    let ids: Vec<_> = listing.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["msg_1", "msg_2"]);
    assert_eq!(listing.messages[1].text(), "See map");
    assert_eq!(
        listing.messages[1].parts[1],
        ContentPart::Image {
            file_id: "file-map".to_string()
        }
    );
}

#[tokio::test]
async fn test_listing_error_statuses() {
    let mock = MockAssistants::new();

    let response = app(&mock, config())
        .oneshot(
            Request::get("/api/threads/thread%20bad/messages")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&mock, config())
        .oneshot(
            Request::get("/api/threads/thread_missing/messages")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().contains("thread_missing"));
}

#[tokio::test]
async fn test_uploaded_file_round_trips_through_proxy() {
    let content = b"species,count\nkoala,3\n".to_vec();
    let mock = MockAssistants::new().with_run(vec![
        MockRunStep::text_delta("msg_1", "Three koalas."),
        MockRunStep::run_completed("run_1"),
    ]);

    let events = stream_events(
        app(&mock, config()),
        multipart_request(&[
            Part::Field("message", "Count the koalas"),
            Part::File("survey 2024.csv", "text/csv", &content),
        ]),
    )
    .await;
    assert!(matches!(terminal(&events), StreamEvent::Done(_)));

    let file_id = mock.posted_messages()[0].1.attachments[0].file_id.clone();
    let response = app(&mock, config())
        .oneshot(
            Request::get(format!("/api/files/{file_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"survey 2024.csv\""
    );
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.to_vec(), content);
}

#[tokio::test]
async fn test_unknown_file_is_not_found() {
    let mock = MockAssistants::new();
    let response = app(&mock, config())
        .oneshot(
            Request::get("/api/files/file-nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let response = app(&MockAssistants::new(), config())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], br#"{"ok":true}"#);
}
