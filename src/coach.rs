//! The [`Coach`] facade: one handle over ingestion, search, generation,
//! document management, and session state.
//!
//! Built once at process start. The vector index lives in SQLite and
//! survives restarts; conversation memory and rate-limiter history are
//! process-lifetime only.

use std::sync::Arc;

use anyhow::Result;
use futures::stream::BoxStream;
use tracing::info;

use interview_coach_core::chunk::TextSplitter;
use interview_coach_core::memory::ConversationMemory;
use interview_coach_core::models::{ConversationTurn, DocumentSummary, Metadata, SearchHit};
use interview_coach_core::store::VectorStore;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::CoachError;
use crate::generate::{Answer, GenerationSettings, Orchestrator, StreamEvent};
use crate::ingest::DocumentIngestor;
use crate::llm::{create_backend, LlmBackend};
use crate::prompt::PromptBuilder;
use crate::rate_limiter::{RateLimitStats, RateLimiter};
use crate::retriever::Retriever;
use crate::sqlite_store::SqliteVectorStore;

pub struct Coach {
    store: Arc<dyn VectorStore>,
    ingestor: DocumentIngestor,
    retriever: Arc<Retriever>,
    memory: Arc<ConversationMemory>,
    limiter: Arc<RateLimiter>,
    orchestrator: Orchestrator,
}

impl Coach {
    /// Opens the SQLite index and builds the configured embedder and LLM
    /// backend.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let store = SqliteVectorStore::open(&config.db.path, embedder).await?;
        let backend = create_backend(&config.llm)?;
        info!(
            db = %config.db.path.display(),
            embedding = %config.embedding.provider,
            llm = backend.name(),
            "coach ready"
        );
        Self::with_parts(config, Arc::new(store), backend)
    }

    /// Assembles a coach around an existing store and backend.
    pub fn with_parts(
        config: &Config,
        store: Arc<dyn VectorStore>,
        backend: Arc<dyn LlmBackend>,
    ) -> Result<Self> {
        let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let retriever = Arc::new(Retriever::from_config(store.clone(), &config.retrieval));
        let memory = Arc::new(ConversationMemory::new(config.generation.memory_ceiling));
        let limiter = Arc::new(RateLimiter::from_secs_f64(config.generation.min_interval_secs));
        let prompts = PromptBuilder::new(
            config.generation.system_prompt.clone(),
            config.generation.max_chunk_chars,
        );

        let orchestrator = Orchestrator::new(
            retriever.clone(),
            memory.clone(),
            limiter.clone(),
            backend,
            prompts,
            GenerationSettings::from_config(&config.generation),
        );

        Ok(Self {
            ingestor: DocumentIngestor::new(store.clone(), splitter),
            store,
            retriever,
            memory,
            limiter,
            orchestrator,
        })
    }

    pub async fn add_document(&self, text: &str, metadata: Metadata) -> Result<String, CoachError> {
        self.ingestor.add_document(text, metadata).await
    }

    /// Ranked search, as used for generation context. Unlike generation,
    /// store failures are reported.
    pub async fn search_documents(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, CoachError> {
        self.retriever
            .try_search(query, Some(k))
            .await
            .map_err(CoachError::retrieval)
    }

    pub async fn generate(&self, question: &str, session: Option<&str>) -> Result<Answer, CoachError> {
        self.orchestrator.generate(question, session).await
    }

    pub fn stream_generate(&self, question: &str, session: Option<&str>) -> BoxStream<'static, StreamEvent> {
        self.orchestrator.stream_generate(question, session)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>, CoachError> {
        self.store.list_documents().await.map_err(CoachError::storage)
    }

    /// Removes every chunk of a document. Returns how many were removed;
    /// unknown ids remove nothing.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize, CoachError> {
        let removed = self
            .store
            .delete_document(document_id)
            .await
            .map_err(CoachError::storage)?;
        info!(document_id, chunks = removed, "document deleted");
        Ok(removed)
    }

    /// Stored messages of a session, oldest first. Unknown sessions are
    /// empty and are not created.
    pub fn history(&self, session: &str) -> Vec<ConversationTurn> {
        if !self.memory.contains(session) {
            return Vec::new();
        }
        self.memory.recent(session, self.memory.ceiling())
    }

    /// Forgets a session's history. Returns `true` if it existed.
    pub fn reset(&self, session: &str) -> bool {
        self.memory.reset(session)
    }

    pub async fn rate_limit_stats(&self, key: &str) -> RateLimitStats {
        self.limiter.stats(key).await
    }
}
