//! Anthropic Messages API adapter.
//!
//! Calls `POST {base_url}/v1/messages` with the assembled prompt as a
//! single user message. Streaming consumes `content_block_delta` events
//! until `message_stop`; an `error` event (e.g. `overloaded_error`) is
//! classified like an HTTP failure.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{classify_message, classify_status, http_client, sse, transport_error};
use super::{BackendError, FragmentStream, LlmBackend};
use crate::config::LlmConfig;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    name: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: Delta },
    #[serde(rename = "error")]
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

impl AnthropicBackend {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self {
            client: http_client(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            name: format!("anthropic:{}", model),
            model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, BackendError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
            stream,
        };

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }
        Ok(resp)
    }
}

/// Maps one SSE payload to a fragment, an error, or nothing.
fn parse_stream_payload(payload: &str) -> Option<Result<String, BackendError>> {
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(StreamEvent::ContentBlockDelta { delta }) => delta.text.filter(|t| !t.is_empty()).map(Ok),
        Ok(StreamEvent::Error { error }) => {
            Some(Err(classify_message(format!("{}: {}", error.kind, error.message))))
        }
        Ok(StreamEvent::Other) | Err(_) => None,
    }
}

fn response_text(resp: MessagesResponse) -> String {
    resp.content.into_iter().filter_map(|b| b.text).collect()
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let resp = self.send(prompt, false).await?;
        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Failed(format!("invalid Anthropic response: {}", e)))?;
        Ok(response_text(parsed))
    }

    async fn stream_complete(&self, prompt: &str) -> Result<FragmentStream, BackendError> {
        let resp = self.send(prompt, true).await?;
        let fragments = sse::data_payloads(resp.bytes_stream()).filter_map(|payload| async move {
            match payload {
                Ok(p) => parse_stream_payload(&p),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(fragments.boxed())
    }
}
