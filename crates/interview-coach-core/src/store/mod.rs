//! Vector store abstraction.
//!
//! A [`VectorStore`] owns chunk persistence and its own [`Embedder`]; callers
//! hand it text and metadata and get back similarity-ranked hits. The app
//! crate provides a SQLite-backed implementation; [`memory::InMemoryVectorStore`]
//! serves tests and ephemeral use.
//!
//! Implementations must be `Send + Sync` and safe for concurrent readers.
//! Writers must make each [`add_chunks`](VectorStore::add_chunks) call
//! all-or-nothing.
//!
//! [`Embedder`]: crate::embedding::Embedder

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocumentChunk, DocumentSummary, SearchHit};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embeds and persists a batch of chunks. Either every chunk becomes
    /// searchable or none does.
    async fn add_chunks(&self, chunks: &[DocumentChunk]) -> Result<()>;

    /// Returns up to `k` hits ordered by descending similarity.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    /// One summary per stored document.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    /// Removes every chunk of `document_id`, returning how many were deleted.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;
}
