//! HTTP transport to the relay

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use ecosure_contracts::request::{FIELD_FILES, FIELD_MESSAGE, FIELD_THREAD_ID};
use ecosure_contracts::{ChatRequest, ErrorBody, MessagesResponse, NormalizedMessage};
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};

use crate::error::ClientError;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// A file read from disk, ready to attach.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub async fn read(path: &Path) -> Result<Self, ClientError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Attachment {
                path: path.display().to_string(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self { filename, bytes })
    }
}

/// What one send carries.
#[derive(Debug, Clone, Default)]
pub struct Turn {
    pub message: String,
    pub thread_id: Option<String>,
    pub files: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct Download {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// The relay endpoints the client uses.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Starts a turn; yields the raw SSE body.
    async fn open_chat(&self, turn: &Turn) -> Result<ByteStream, ClientError>;

    async fn thread_messages(&self, thread_id: &str)
    -> Result<Vec<NormalizedMessage>, ClientError>;

    async fn download(&self, file_id: &str) -> Result<Download, ClientError>;
}

pub struct HttpRelay {
    client: Client,
    base_url: String,
}

impl HttpRelay {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(|source| ClientError::Connect {
            url: self.base_url.clone(),
            source,
        })?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|err| err.error)
            .unwrap_or(body);
        Err(ClientError::Status { status, message })
    }
}

/// Link the relay serves a stored file under.
pub fn file_url(base_url: &str, file_id: &str) -> String {
    format!("{}/api/files/{}", base_url.trim_end_matches('/'), file_id)
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn open_chat(&self, turn: &Turn) -> Result<ByteStream, ClientError> {
        let request = self
            .client
            .post(self.url("/api/chat/stream"))
            .header(ACCEPT, "text/event-stream");

        let request = if turn.files.is_empty() {
            let mut body = ChatRequest::new(turn.message.clone());
            body.thread_id = turn.thread_id.clone();
            request.json(&body)
        } else {
            let mut form = Form::new().text(FIELD_MESSAGE, turn.message.clone());
            if let Some(thread_id) = &turn.thread_id {
                form = form.text(FIELD_THREAD_ID, thread_id.clone());
            }
            for file in &turn.files {
                let mime = mime_guess::from_path(&file.filename).first_or_octet_stream();
                let part = Part::bytes(file.bytes.clone())
                    .file_name(file.filename.clone())
                    .mime_str(mime.essence_str())?;
                form = form.part(FIELD_FILES, part);
            }
            request.multipart(form)
        };

        let response = self.send(request).await?;
        Ok(Box::pin(response.bytes_stream().map(|chunk| {
            chunk.map_err(|err| ClientError::Stream(err.to_string()))
        })))
    }

    async fn thread_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<NormalizedMessage>, ClientError> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/api/threads/{thread_id}/messages"))),
            )
            .await?;
        let listing: MessagesResponse = response.json().await?;
        Ok(listing.messages)
    }

    async fn download(&self, file_id: &str) -> Result<Download, ClientError> {
        let response = self
            .send(self.client.get(self.url(&format!("/api/files/{file_id}"))))
            .await?;
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition);
        let bytes = response.bytes().await?.to_vec();
        Ok(Download { filename, bytes })
    }
}

/// `attachment; filename="report.pdf"` → `report.pdf`
pub fn filename_from_disposition(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = raw.trim().trim_matches('"');
        // Never let a server-chosen name escape the target directory.
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
    })
}
