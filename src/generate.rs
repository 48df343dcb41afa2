//! Answer generation: retrieval, prompt assembly, paced and retried LLM
//! calls, and conversation memory updates.
//!
//! # Per-call state machine
//!
//! ```text
//! PREPARING ─▶ RETRIEVING ─▶ PROMPTING ─▶ CALLING(n)
//!                                            │
//!                 ┌──────── throttled, n < max_retries: sleep base·2^(n-1)
//!                 ▼
//!             CALLING(n+1) ... ─▶ SUCCEEDED │ FAILED
//! ```
//!
//! - Retrieval failures degrade to an empty context.
//! - Every attempt is paced by the [`RateLimiter`] keyed on the session id.
//!   A key the limiter has never seen is released at once, so the first
//!   turn of a new session pays no wait. Concurrent turns of one session
//!   and turns after a `reset` are still spaced against the last release.
//! - Only [`BackendError::Throttled`] is retried. Other failures, and
//!   throttling on the last attempt, end the call.
//! - Memory gains exactly one user/assistant pair, and only on success.
//!
//! The streaming variant follows the same states. A throttled stream is
//! retried only while nothing has been forwarded; once output has reached
//! the caller, any failure ends the stream with
//! [`CoachError::StreamInterrupted`]. Dropping the stream early never
//! touches memory.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use interview_coach_core::memory::ConversationMemory;

use crate::config::GenerationConfig;
use crate::error::CoachError;
use crate::llm::{BackendError, FragmentStream, LlmBackend};
use crate::prompt::PromptBuilder;
use crate::rate_limiter::RateLimiter;
use crate::retriever::Retriever;

/// Bounded exponential backoff on throttling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, counting the first.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Sleep after the failed attempt with zero-based index `failed`.
    pub fn backoff(&self, failed: u32) -> Duration {
        self.base_delay.mul_f64(2f64.powi(failed as i32))
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub retry: RetryPolicy,
    pub history_turns: usize,
}

impl GenerationSettings {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: config.max_retries.max(1),
                base_delay: Duration::from_secs_f64(config.base_delay_secs.max(0.0)),
            },
            history_turns: config.history_turns,
        }
    }
}

/// A completed answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub session_id: String,
    pub text: String,
    /// Backend calls made, including the successful one.
    pub attempts: u32,
    /// Retrieved chunks included in the prompt.
    pub context_chunks: usize,
}

/// One item of a streamed answer. `Done` or `Failed` is always last.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Done { session_id: String },
    Failed(CoachError),
}

/// Typed result of one backend attempt.
enum Outcome<T> {
    Success(T),
    Throttled(String),
    Fatal(CoachError),
}

impl<T> From<Result<T, BackendError>> for Outcome<T> {
    fn from(result: Result<T, BackendError>) -> Self {
        match result.map_err(CoachError::from) {
            Ok(v) => Outcome::Success(v),
            Err(CoachError::Throttling(msg)) => Outcome::Throttled(msg),
            Err(err) => Outcome::Fatal(err),
        }
    }
}

/// Everything a call needs once PREPARING through PROMPTING are done.
struct Turn {
    session_id: String,
    question: String,
    prompt: String,
    context_chunks: usize,
}

enum StreamState {
    Start {
        question: String,
        session: Option<String>,
    },
    Calling {
        turn: Turn,
        attempt: u32,
    },
    Streaming {
        turn: Turn,
        attempt: u32,
        fragments: FragmentStream,
        answer: String,
    },
    Finished,
}

#[derive(Clone)]
pub struct Orchestrator {
    retriever: Arc<Retriever>,
    memory: Arc<ConversationMemory>,
    limiter: Arc<RateLimiter>,
    backend: Arc<dyn LlmBackend>,
    prompts: Arc<PromptBuilder>,
    settings: GenerationSettings,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<Retriever>,
        memory: Arc<ConversationMemory>,
        limiter: Arc<RateLimiter>,
        backend: Arc<dyn LlmBackend>,
        prompts: PromptBuilder,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            retriever,
            memory,
            limiter,
            backend,
            prompts: Arc::new(prompts),
            settings,
        }
    }

    /// Generates a complete answer to `question` within `session`, creating
    /// a session (with a fresh id) when none is given.
    pub async fn generate(&self, question: &str, session: Option<&str>) -> Result<Answer, CoachError> {
        let turn = self.prepare(question, session).await?;
        let mut attempt = 0;

        loop {
            self.pace(&turn).await;
            attempt += 1;
            debug!(session = %turn.session_id, attempt, backend = self.backend.name(), "calling backend");

            match Outcome::from(self.backend.complete(&turn.prompt).await) {
                Outcome::Success(text) => {
                    self.memory.append(&turn.session_id, &turn.question, &text);
                    info!(session = %turn.session_id, attempts = attempt, chars = text.len(), "answer generated");
                    return Ok(Answer {
                        session_id: turn.session_id,
                        text,
                        attempts: attempt,
                        context_chunks: turn.context_chunks,
                    });
                }
                Outcome::Throttled(message) => {
                    let delay = self.backoff_or_exhaust(&turn, attempt, message)?;
                    tokio::time::sleep(delay).await;
                }
                Outcome::Fatal(err) => {
                    warn!(session = %turn.session_id, attempt, error = %err, "generation failed");
                    return Err(err);
                }
            }
        }
    }

    /// Streams an answer as it is generated. The stream is lazy: nothing
    /// happens until it is polled.
    pub fn stream_generate(&self, question: &str, session: Option<&str>) -> BoxStream<'static, StreamEvent> {
        let start = StreamState::Start {
            question: question.to_string(),
            session: session.map(str::to_string),
        };
        stream::unfold((self.clone(), start), |(orch, state)| async move {
            let (event, next) = orch.advance(state).await?;
            Some((event, (orch, next)))
        })
        .boxed()
    }

    /// PREPARING, RETRIEVING, and PROMPTING.
    async fn prepare(&self, question: &str, session: Option<&str>) -> Result<Turn, CoachError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(CoachError::InvalidRequest("question must not be empty".to_string()));
        }
        let session_id = session
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let fresh = self.memory.open(&session_id);
        let history = self.memory.recent(&session_id, self.settings.history_turns);
        let context = self.retriever.search(question, None).await;
        let prompt = self.prompts.build(&history, &context, question);
        debug!(
            session = %session_id,
            fresh,
            history = history.len(),
            context = context.len(),
            "prompt assembled"
        );

        Ok(Turn {
            session_id,
            question: question.to_string(),
            prompt,
            context_chunks: context.len(),
        })
    }

    /// Rate-limit gate before every attempt.
    async fn pace(&self, turn: &Turn) {
        self.limiter.wait_if_needed(&turn.session_id).await;
    }

    /// Delay before the next attempt, or the terminal error once
    /// `attempts` calls have been throttled.
    fn backoff_or_exhaust(&self, turn: &Turn, attempts: u32, message: String) -> Result<Duration, CoachError> {
        let retry = self.settings.retry;
        if attempts >= retry.max_retries {
            warn!(session = %turn.session_id, attempts, "throttled; retries exhausted");
            return Err(CoachError::ExhaustedRetries {
                attempts,
                last: message,
            });
        }
        let delay = retry.backoff(attempts - 1);
        warn!(
            session = %turn.session_id,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "throttled; backing off"
        );
        Ok(delay)
    }

    /// Runs the stream state machine until it has an event to emit.
    async fn advance(&self, mut state: StreamState) -> Option<(StreamEvent, StreamState)> {
        loop {
            state = match state {
                StreamState::Finished => return None,

                StreamState::Start { question, session } => {
                    match self.prepare(&question, session.as_deref()).await {
                        Ok(turn) => StreamState::Calling { turn, attempt: 0 },
                        Err(err) => return Some((StreamEvent::Failed(err), StreamState::Finished)),
                    }
                }

                StreamState::Calling { turn, attempt } => {
                    self.pace(&turn).await;
                    let attempt = attempt + 1;
                    debug!(session = %turn.session_id, attempt, backend = self.backend.name(), "opening stream");

                    match Outcome::from(self.backend.stream_complete(&turn.prompt).await) {
                        Outcome::Success(fragments) => StreamState::Streaming {
                            turn,
                            attempt,
                            fragments,
                            answer: String::new(),
                        },
                        Outcome::Throttled(message) => match self.backoff_or_exhaust(&turn, attempt, message) {
                            Ok(delay) => {
                                tokio::time::sleep(delay).await;
                                StreamState::Calling { turn, attempt }
                            }
                            Err(err) => return Some((StreamEvent::Failed(err), StreamState::Finished)),
                        },
                        Outcome::Fatal(err) => {
                            warn!(session = %turn.session_id, attempt, error = %err, "stream failed to open");
                            return Some((StreamEvent::Failed(err), StreamState::Finished));
                        }
                    }
                }

                StreamState::Streaming {
                    turn,
                    attempt,
                    mut fragments,
                    mut answer,
                } => {
                    let next = fragments.next().await;
                    match next {
                        Some(Ok(text)) => {
                            answer.push_str(&text);
                            let next = StreamState::Streaming {
                                turn,
                                attempt,
                                fragments,
                                answer,
                            };
                            return Some((StreamEvent::Delta(text), next));
                        }
                        Some(Err(err)) if answer.is_empty() => match Outcome::<()>::from(Err(err)) {
                            Outcome::Throttled(message) => match self.backoff_or_exhaust(&turn, attempt, message) {
                                Ok(delay) => {
                                    tokio::time::sleep(delay).await;
                                    StreamState::Calling { turn, attempt }
                                }
                                Err(err) => return Some((StreamEvent::Failed(err), StreamState::Finished)),
                            },
                            Outcome::Fatal(err) => {
                                warn!(session = %turn.session_id, attempt, error = %err, "stream failed");
                                return Some((StreamEvent::Failed(err), StreamState::Finished));
                            }
                            Outcome::Success(()) => StreamState::Finished,
                        },
                        Some(Err(err)) => {
                            warn!(
                                session = %turn.session_id,
                                delivered = answer.len(),
                                error = %err,
                                "stream interrupted"
                            );
                            let err = CoachError::StreamInterrupted(err.message().to_string());
                            return Some((StreamEvent::Failed(err), StreamState::Finished));
                        }
                        None => {
                            self.memory.append(&turn.session_id, &turn.question, &answer);
                            info!(session = %turn.session_id, attempts = attempt, chars = answer.len(), "stream completed");
                            let done = StreamEvent::Done {
                                session_id: turn.session_id,
                            };
                            return Some((done, StreamState::Finished));
                        }
                    }
                }
            };
        }
    }
}
