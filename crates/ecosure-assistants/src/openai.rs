//! HTTP client for the hosted assistant service

use async_trait::async_trait;
use ecosure_contracts::SseDecoder;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::client::AssistantsApi;
use crate::error::{AssistantError, Result};
use crate::http_client::build_http_client;
use crate::retry::{RetryPolicy, response_to_error};
use crate::types::{
    Assistant, ByteStream, FileObject, ListMessages, NewMessage, Run, Thread, ThreadMessage,
    UpstreamEvent, UpstreamEventStream,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";
const FILE_PURPOSE: &str = "assistants";

#[derive(serde::Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

/// Assistants client over HTTP
#[derive(Clone)]
pub struct OpenAIAssistants {
    client: Client,
    api_key: String,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl OpenAIAssistants {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_http_client(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Set custom base URL (for compatible services and test servers)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER, BETA_VALUE)
    }

    /// GET with backoff on transient failures.
    async fn get(&self, path: &str) -> Result<Response> {
        let url = self.url(path);
        let mut last_error = None;

        for attempt in 0..=self.retry_policy.max_retries {
            let error = match self.authorized(self.client.get(&url)).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => response_to_error(response).await,
                Err(err) => AssistantError::Http(err),
            };

            if !error.is_retryable() || attempt == self.retry_policy.max_retries {
                return Err(error);
            }

            let delay = self
                .retry_policy
                .delay_for(attempt + 1, error.retry_after());
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                path,
                error = %error,
                "Retrying assistant service request"
            );
            tokio::time::sleep(delay).await;
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            AssistantError::Stream("Assistant service request failed after retries".to_string())
        }))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.get(path).await?.json().await?)
    }

    /// POST without retries: each call may create something upstream.
    async fn post(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.authorized(builder).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(response_to_error(response).await)
        }
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let response = self.post(self.client.post(self.url(path)).json(body)).await?;
        Ok(response.json().await?)
    }
}

fn upstream_event(event: String, data: &str) -> UpstreamEvent {
    // The service ends the stream with a literal `[DONE]` payload.
    let data = serde_json::from_str(data).unwrap_or_else(|_| {
        if data.is_empty() {
            Value::Null
        } else {
            Value::String(data.to_string())
        }
    });
    UpstreamEvent::new(event, data)
}

#[async_trait]
impl AssistantsApi for OpenAIAssistants {
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        self.get_json(&format!("/assistants/{assistant_id}")).await
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.post_json("/threads", &json!({})).await
    }

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<FileObject> {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime.essence_str())?;
        let form = Form::new()
            .text("purpose", FILE_PURPOSE)
            .part("file", part);

        let response = self
            .post(self.client.post(self.url("/files")).multipart(form))
            .await?;
        Ok(response.json().await?)
    }

    async fn create_message(&self, thread_id: &str, message: NewMessage) -> Result<ThreadMessage> {
        let body = serde_json::to_value(&message)?;
        self.post_json(&format!("/threads/{thread_id}/messages"), &body)
            .await
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<UpstreamEventStream> {
        let body = json!({ "assistant_id": assistant_id, "stream": true });
        let response = self
            .post(
                self.client
                    .post(self.url(&format!("/threads/{thread_id}/runs")))
                    .json(&body),
            )
            .await?;

        let mut byte_stream = response.bytes_stream();
        Ok(Box::pin(async_stream::stream! {
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        yield Err(AssistantError::Stream(err.to_string()));
                        return;
                    }
                };

                for frame in decoder.push(&chunk) {
                    yield Ok(upstream_event(frame.event, &frame.data));
                }
            }

            // Some servers close without the trailing blank line.
            if let Some(frame) = decoder.finish() {
                yield Ok(upstream_event(frame.event, &frame.data));
            }
        }))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.post_json(
            &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
            &json!({}),
        )
        .await
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        query: ListMessages,
    ) -> Result<Vec<ThreadMessage>> {
        let path = format!(
            "/threads/{thread_id}/messages?order={}&limit={}",
            query.order.as_str(),
            query.limit
        );
        let list: MessageList = self.get_json(&path).await?;
        Ok(list.data)
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject> {
        self.get_json(&format!("/files/{file_id}")).await
    }

    async fn file_content(&self, file_id: &str) -> Result<ByteStream> {
        let response = self.get(&format!("/files/{file_id}/content")).await?;
        Ok(Box::pin(response.bytes_stream().map(|chunk| {
            chunk.map_err(|err| AssistantError::Stream(err.to_string()))
        })))
    }
}
