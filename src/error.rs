//! Error taxonomy surfaced to callers of the coach.
//!
//! [`CoachError`] is the closed set of outcomes a caller may branch on.
//! Recoverable conditions (throttling before the retry budget runs out,
//! retrieval failures during generation) are handled internally and only
//! reach the caller when they change the outcome.

use thiserror::Error;

use crate::llm::BackendError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoachError {
    /// Ingestion input produced zero chunks.
    #[error("document has no indexable content")]
    EmptyContent,

    /// The backend rate-limited a request that is not retried further.
    #[error("backend throttled the request: {0}")]
    Throttling(String),

    /// Any non-throttling backend failure.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("gave up after {attempts} throttled attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: String },

    /// Explicit search failed in the vector store.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// A stream failed after part of the answer was already delivered.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CoachError {
    /// Stable machine-readable code, used in HTTP error envelopes and SSE
    /// `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            CoachError::EmptyContent => "empty_content",
            CoachError::Throttling(_) => "throttled",
            CoachError::Backend(_) => "backend",
            CoachError::ExhaustedRetries { .. } => "exhausted_retries",
            CoachError::Retrieval(_) => "retrieval",
            CoachError::StreamInterrupted(_) => "stream_interrupted",
            CoachError::Storage(_) => "storage",
            CoachError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        CoachError::Storage(format!("{:#}", err))
    }

    pub(crate) fn retrieval(err: anyhow::Error) -> Self {
        CoachError::Retrieval(format!("{:#}", err))
    }
}

impl From<BackendError> for CoachError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Throttled(msg) => CoachError::Throttling(msg),
            BackendError::Failed(msg) => CoachError::Backend(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(CoachError::EmptyContent.kind(), "empty_content");
        assert_eq!(
            CoachError::ExhaustedRetries {
                attempts: 3,
                last: "429".into()
            }
            .kind(),
            "exhausted_retries"
        );
        assert_eq!(CoachError::StreamInterrupted("x".into()).kind(), "stream_interrupted");
    }

    #[test]
    fn test_backend_error_conversion_keeps_message() {
        let err: CoachError = BackendError::Failed("401 unauthorized".into()).into();
        assert_eq!(err, CoachError::Backend("401 unauthorized".into()));
        assert!(err.to_string().contains("401 unauthorized"));

        let err: CoachError = BackendError::Throttled("slow down".into()).into();
        assert_eq!(err.kind(), "throttled");
    }

    #[test]
    fn test_exhausted_message_names_attempts() {
        let err = CoachError::ExhaustedRetries {
            attempts: 5,
            last: "Too many requests".into(),
        };
        assert_eq!(
            err.to_string(),
            "gave up after 5 throttled attempts: Too many requests"
        );
    }
}
