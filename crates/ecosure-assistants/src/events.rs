//! Normalization of streaming-run events.
//!
//! The service and its SDKs have used several names for the same event over
//! time. Every upstream frame is mapped here, once, to a [`RunEvent`] so the
//! relay only deals with one vocabulary.

use serde_json::Value;

use crate::types::{Run, ThreadMessage, UpstreamEvent};

#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The run exists upstream and can be cancelled by id.
    RunCreated(Run),
    /// Incremental assistant text.
    TextDelta {
        message_id: Option<String>,
        text: String,
    },
    /// A message finished; carries its full content.
    MessageCompleted(ThreadMessage),
    /// The run reached a terminal status, successful or not.
    RunCompleted(Run),
    /// The run paused waiting on tool outputs.
    RequiresAction(Run),
    /// The stream reported a failure.
    Error(String),
    /// Anything else; lifecycle noise such as step or queue events.
    Unknown { name: String },
}

impl From<&UpstreamEvent> for RunEvent {
    fn from(event: &UpstreamEvent) -> Self {
        normalize(&event.name, &event.data)
    }
}

/// Maps an upstream event name and payload to a [`RunEvent`].
pub fn normalize(name: &str, data: &Value) -> RunEvent {
    match name {
        "thread.run.created" | "runCreated" | "run.created" => match parse_run(data) {
            Some(run) => RunEvent::RunCreated(run),
            None => unknown(name),
        },
        "thread.message.delta" | "textDelta" | "text.delta" => match delta_text(data) {
            Some(text) => RunEvent::TextDelta {
                message_id: data.get("id").and_then(Value::as_str).map(str::to_string),
                text,
            },
            None => unknown(name),
        },
        "thread.message.completed" | "messageCompleted" | "message.completed" => {
            match serde_json::from_value::<ThreadMessage>(data.clone()) {
                Ok(message) => RunEvent::MessageCompleted(message),
                Err(err) => {
                    tracing::debug!(event = name, error = %err, "Unreadable completed message");
                    unknown(name)
                }
            }
        }
        "thread.run.completed"
        | "thread.run.failed"
        | "thread.run.cancelled"
        | "thread.run.expired"
        | "thread.run.incomplete"
        | "runCompleted"
        | "run.completed" => match parse_run(data) {
            Some(mut run) => {
                if run.status.is_empty() {
                    run.status = name.rsplit('.').next().unwrap_or_default().to_string();
                    if run.status == "runCompleted" {
                        run.status = Run::STATUS_COMPLETED.to_string();
                    }
                }
                RunEvent::RunCompleted(run)
            }
            None => unknown(name),
        },
        "thread.run.requires_action" | "runRequiresAction" | "run.requires_action" => {
            match parse_run(data) {
                Some(run) => RunEvent::RequiresAction(run),
                None => unknown(name),
            }
        }
        "error" => RunEvent::Error(error_message(data)),
        _ => unknown(name),
    }
}

fn unknown(name: &str) -> RunEvent {
    RunEvent::Unknown {
        name: name.to_string(),
    }
}

fn parse_run(data: &Value) -> Option<Run> {
    serde_json::from_value(data.clone()).ok()
}

// Current payloads nest text under `delta.content[].text.value`; the legacy
// SDK event carried a bare `{ "value": ... }`.
fn delta_text(data: &Value) -> Option<String> {
    if let Some(parts) = data.pointer("/delta/content").and_then(Value::as_array) {
        let text: String = parts
            .iter()
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|part| part.pointer("/text/value").and_then(Value::as_str))
            .collect();
        return (!text.is_empty()).then_some(text);
    }

    data.get("value")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn error_message(data: &Value) -> String {
    data.get("message")
        .or_else(|| data.pointer("/error/message"))
        .or_else(|| data.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| data.as_str().map(str::to_string))
        .unwrap_or_else(|| "Assistant stream reported an error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_and_legacy_delta_names_agree() {
        let current = normalize(
            "thread.message.delta",
            &json!({
                "id": "msg_1",
                "object": "thread.message.delta",
                "delta": {"content": [{"index": 0, "type": "text", "text": {"value": "Hel"}}]}
            }),
        );
        let legacy = normalize("textDelta", &json!({"value": "Hel"}));
        let dotted = normalize("text.delta", &json!({"value": "Hel"}));

        for event in [&current, &legacy, &dotted] {
            match event {
                RunEvent::TextDelta { text, .. } => assert_eq!(text, "Hel"),
                other => panic!("expected text delta, got {other:?}"),
            }
        }
        assert!(matches!(
            current,
            RunEvent::TextDelta { message_id: Some(ref id), .. } if id == "msg_1"
        ));
    }

    #[test]
    fn test_delta_without_text_is_unknown() {
        let event = normalize(
            "thread.message.delta",
            &json!({"delta": {"content": [{"type": "image_file", "image_file": {"file_id": "f"}}]}}),
        );
        assert!(matches!(event, RunEvent::Unknown { .. }));
    }

    #[test]
    fn test_terminal_run_events_keep_status() {
        let failed = normalize(
            "thread.run.failed",
            &json!({"id": "run_1", "status": "failed", "last_error": {"message": "quota"}}),
        );
        match failed {
            RunEvent::RunCompleted(run) => {
                assert_eq!(run.status, "failed");
                assert_eq!(run.failure_reason(), "quota");
            }
            other => panic!("expected run completion, got {other:?}"),
        }

        let legacy = normalize("runCompleted", &json!({"id": "run_2"}));
        match legacy {
            RunEvent::RunCompleted(run) => assert!(run.is_completed()),
            other => panic!("expected run completion, got {other:?}"),
        }

        let expired = normalize("thread.run.expired", &json!({"id": "run_3"}));
        match expired {
            RunEvent::RunCompleted(run) => assert_eq!(run.status, "expired"),
            other => panic!("expected run completion, got {other:?}"),
        }
    }

    #[test]
    fn test_message_completed_aliases() {
        let payload = json!({
            "id": "msg_9",
            "role": "assistant",
            "content": [{"type": "text", "text": {"value": "Done"}}]
        });
        for name in ["thread.message.completed", "messageCompleted", "message.completed"] {
            match normalize(name, &payload) {
                RunEvent::MessageCompleted(message) => assert_eq!(message.text(), "Done"),
                other => panic!("{name}: expected message completion, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_requires_action_and_error() {
        assert!(matches!(
            normalize("thread.run.requires_action", &json!({"id": "run_1", "status": "requires_action"})),
            RunEvent::RequiresAction(_)
        ));
        assert!(matches!(
            normalize("runRequiresAction", &json!({"id": "run_1"})),
            RunEvent::RequiresAction(_)
        ));

        match normalize("error", &json!({"message": "Rate limited"})) {
            RunEvent::Error(message) => assert_eq!(message, "Rate limited"),
            other => panic!("expected error, got {other:?}"),
        }
        match normalize("error", &json!({"error": {"message": "Nested"}})) {
            RunEvent::Error(message) => assert_eq!(message, "Nested"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_lifecycle_noise_is_unknown() {
        for name in ["thread.run.queued", "thread.run.step.created", "done"] {
            assert!(matches!(normalize(name, &Value::Null), RunEvent::Unknown { .. }));
        }
    }
}
