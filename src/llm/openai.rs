//! OpenAI-compatible chat-completions adapter.
//!
//! Works against api.openai.com and any server exposing the same
//! `POST {base_url}/chat/completions` shape (Ollama, vLLM, LM Studio).
//! The `Authorization` header is sent only when a key is configured.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{classify_message, classify_status, http_client, sse, transport_error};
use super::{BackendError, FragmentStream, LlmBackend};
use crate::config::LlmConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    name: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
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
            name: format!("openai:{}", model),
            model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream,
        };

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }
        Ok(resp)
    }
}

/// Maps one SSE payload to a fragment, an error, or nothing. `[DONE]`
/// carries no text.
fn parse_stream_payload(payload: &str) -> Option<Result<String, BackendError>> {
    if payload.trim() == "[DONE]" {
        return None;
    }
    let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
    if let Some(error) = chunk.error {
        return Some(Err(classify_message(error.to_string())));
    }
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|t| !t.is_empty())
        .map(Ok)
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let resp = self.send(prompt, false).await?;
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Failed(format!("invalid chat completion response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Failed("chat completion returned no choices".to_string()))
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
