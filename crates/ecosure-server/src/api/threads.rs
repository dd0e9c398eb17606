//! `GET /api/threads/{id}/messages`

use axum::Json;
use axum::extract::{Path, State};
use ecosure_assistants::{ListMessages, ThreadMessage};
use ecosure_contracts::{MessagesResponse, is_resource_id};

use super::state::AppState;
use crate::error::ApiError;

/// The thread's messages, oldest first, in normalized form.
pub async fn list_thread_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    if !is_resource_id(&thread_id) {
        return Err(ApiError::BadRequest("Invalid thread id".to_string()));
    }

    let messages = state
        .assistants
        .list_messages(&thread_id, ListMessages::chronological())
        .await?;
    tracing::debug!(thread_id, count = messages.len(), "Listed thread messages");

    Ok(Json(MessagesResponse {
        messages: messages.iter().map(ThreadMessage::normalize).collect(),
    }))
}
