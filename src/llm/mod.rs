//! LLM backend abstraction and adapters.
//!
//! The orchestrator only sees [`LlmBackend`]: a blocking `complete` and a
//! lazily consumed `stream_complete`. Every adapter classifies its
//! failures into [`BackendError`] at this boundary, so retry decisions
//! never depend on provider-specific error types.
//!
//! | Config value | Adapter |
//! |--------------|---------|
//! | `"anthropic"` | [`anthropic::AnthropicBackend`] (Messages API) |
//! | `"openai"` | [`openai::OpenAiBackend`] (chat completions; also Ollama) |
//! | `"disabled"` | [`DisabledBackend`] |

pub mod anthropic;
pub mod openai;
pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tracing::warn;

use crate::config::LlmConfig;

/// Lazy, finite, non-restartable sequence of answer fragments.
pub type FragmentStream = BoxStream<'static, Result<String, BackendError>>;

/// Backend failure, classified at the adapter boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Rate-limit or overload signal; the orchestrator may retry.
    #[error("throttled: {0}")]
    Throttled(String),
    /// Anything else; surfaced without retry.
    #[error("{0}")]
    Failed(String),
}

impl BackendError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, BackendError::Throttled(_))
    }

    pub fn message(&self) -> &str {
        match self {
            BackendError::Throttled(m) | BackendError::Failed(m) => m,
        }
    }
}

/// Substrings that mark a message as a throttling signal.
pub const THROTTLE_SIGNALS: &[&str] = &[
    "throttlingexception",
    "too many requests",
    "rate_limit",
    "rate limit",
    "overloaded",
];

/// Classifies a free-form error message.
pub fn classify_message(message: impl Into<String>) -> BackendError {
    let message = message.into();
    let lower = message.to_lowercase();
    if THROTTLE_SIGNALS.iter().any(|s| lower.contains(s)) {
        BackendError::Throttled(message)
    } else {
        BackendError::Failed(message)
    }
}

/// Classifies a non-success HTTP response. 429 and 529 always throttle;
/// other statuses throttle only if the body carries a known signal.
pub fn classify_status(status: u16, body: &str) -> BackendError {
    let message = format!("HTTP {}: {}", status, body.trim());
    match status {
        429 | 529 => BackendError::Throttled(message),
        _ => classify_message(message),
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> BackendError {
    classify_message(format!("request failed: {}", err))
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Short identifier for logs (`anthropic:claude-...`).
    fn name(&self) -> &str;

    /// Sends `prompt` and waits for the whole answer.
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;

    /// Sends `prompt` and returns the answer as it is generated. Errors
    /// before the first fragment are returned directly; later ones are
    /// yielded as the stream's last item.
    async fn stream_complete(&self, prompt: &str) -> Result<FragmentStream, BackendError>;
}

/// Backend used when no LLM is configured or its key is missing.
pub struct DisabledBackend {
    reason: String,
}

impl DisabledBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LlmBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
        Err(BackendError::Failed(self.reason.clone()))
    }

    async fn stream_complete(&self, _prompt: &str) -> Result<FragmentStream, BackendError> {
        Err(BackendError::Failed(self.reason.clone()))
    }
}

pub(crate) fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Builds the backend named by `config.provider`.
///
/// A missing API key does not fail construction: the coach can still
/// ingest and search, and generation reports the missing key.
pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>> {
    let key_env = config.key_env();
    let api_key = std::env::var(key_env).ok().filter(|k| !k.is_empty());

    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend::new("LLM backend is disabled"))),
        "anthropic" => match api_key {
            Some(key) => Ok(Arc::new(anthropic::AnthropicBackend::new(config, key)?)),
            None => {
                warn!(env = key_env, "no API key set; generation is unavailable");
                Ok(Arc::new(DisabledBackend::new(format!(
                    "{} environment variable not set",
                    key_env
                ))))
            }
        },
        "openai" => Ok(Arc::new(openai::OpenAiBackend::new(config, api_key)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}
