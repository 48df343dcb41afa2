//! In-memory [`VectorStore`] for tests and throwaway sessions.
//!
//! Chunks and vectors sit behind a single `std::sync::RwLock` so an
//! `add_chunks` batch becomes visible atomically. Search is brute-force
//! cosine similarity.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use anyhow::{ensure, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{DocumentChunk, DocumentSummary, SearchHit};

use super::VectorStore;

struct StoredChunk {
    chunk: DocumentChunk,
    vector: Vec<f32>,
}

pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunks: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        ensure!(
            vectors.len() == chunks.len(),
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        );

        let mut stored = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        stored.extend(
            chunks
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| StoredChunk { chunk, vector }),
        );
        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let stored = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(f32, &StoredChunk)> = stored
            .iter()
            .map(|sc| (cosine_similarity(&query_vec, &sc.vector), sc))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, sc)| SearchHit::new(sc.chunk.text.clone(), sc.chunk.metadata.clone(), score))
            .collect())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let stored = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut docs: BTreeMap<&str, (usize, &DocumentChunk)> = BTreeMap::new();
        for sc in stored.iter() {
            docs.entry(sc.chunk.document_id.as_str())
                .and_modify(|(count, _)| *count += 1)
                .or_insert((1, &sc.chunk));
        }
        Ok(docs
            .into_iter()
            .map(|(id, (count, first))| DocumentSummary::from_metadata(id, &first.metadata, count))
            .collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut stored = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        let before = stored.len();
        stored.retain(|sc| sc.chunk.document_id != document_id);
        Ok(before - stored.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_document, TextSplitter};
    use crate::embedding::HashEmbedder;
    use crate::models::Metadata;

    fn store() -> InMemoryVectorStore {
        InMemoryVectorStore::new(Arc::new(HashEmbedder::default()))
    }

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_search_returns_best_match_first() {
        let store = store();
        let splitter = TextSplitter::default();
        store
            .add_chunks(&chunk_document(
                "doc-a",
                "Rust ownership and borrowing explained",
                &meta(&[("source", "rust")]),
                &splitter,
            ))
            .await
            .unwrap();
        store
            .add_chunks(&chunk_document(
                "doc-b",
                "Pasta recipes with tomato sauce",
                &meta(&[("source", "food")]),
                &splitter,
            ))
            .await
            .unwrap();

        let hits = store.similarity_search("rust borrowing", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].meta("source"), Some("rust"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_list_and_delete_documents() {
        let store = store();
        let splitter = TextSplitter::new(100, 20).unwrap();
        let text = "word ".repeat(100);
        let chunks = chunk_document("doc-1", &text, &meta(&[("source", "notes")]), &splitter);
        let n = chunks.len();
        assert!(n > 1);
        store.add_chunks(&chunks).await.unwrap();
        store
            .add_chunks(&chunk_document("doc-2", "short", &Metadata::new(), &splitter))
            .await
            .unwrap();

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "doc-1");
        assert_eq!(docs[0].chunk_count, n);
        assert_eq!(docs[0].source, "notes");
        assert_eq!(docs[1].source, "unknown");
        assert_eq!(docs[1].kind, "web");

        assert_eq!(store.delete_document("doc-1").await.unwrap(), n);
        assert_eq!(store.delete_document("doc-1").await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_k_returns_nothing() {
        let store = store();
        let splitter = TextSplitter::default();
        store
            .add_chunks(&chunk_document("d", "hello", &Metadata::new(), &splitter))
            .await
            .unwrap();
        assert!(store.similarity_search("hello", 0).await.unwrap().is_empty());
    }
}
