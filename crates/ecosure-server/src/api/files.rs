//! `GET /api/files/{id}`

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use ecosure_contracts::is_resource_id;

use super::state::AppState;
use crate::error::ApiError;

/// Streams a stored file back under its original name.
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    if !is_resource_id(&file_id) {
        return Err(ApiError::BadRequest("Invalid file id".to_string()));
    }

    let meta = state.assistants.retrieve_file(&file_id).await?;
    let filename = meta
        .filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| file_id.clone());
    let content = state.assistants.file_content(&file_id).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(&filename, &file_id),
    );
    Ok((headers, Body::from_stream(content)).into_response())
}

fn content_disposition(filename: &str, file_id: &str) -> HeaderValue {
    let cleaned: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{cleaned}\""))
        .or_else(|_| HeaderValue::from_str(&format!("attachment; filename=\"{file_id}\"")))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
