//! Document ingestion: split, tag, and hand chunks to the vector store.
//!
//! Every call mints a fresh UUID document id. The store's `add_chunks`
//! is all-or-nothing, so a failed call leaves no partial document behind.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use interview_coach_core::chunk::{chunk_document, TextSplitter};
use interview_coach_core::models::{Metadata, META_SOURCE};
use interview_coach_core::store::VectorStore;

use crate::error::CoachError;

pub struct DocumentIngestor {
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
}

impl DocumentIngestor {
    pub fn new(store: Arc<dyn VectorStore>, splitter: TextSplitter) -> Self {
        Self { store, splitter }
    }

    /// Indexes `text` and returns its new document id.
    ///
    /// Fails with [`CoachError::EmptyContent`] when the text yields no chunks.
    pub async fn add_document(&self, text: &str, metadata: Metadata) -> Result<String, CoachError> {
        let document_id = Uuid::new_v4().to_string();
        let chunks = chunk_document(&document_id, text, &metadata, &self.splitter);
        if chunks.is_empty() {
            return Err(CoachError::EmptyContent);
        }

        self.store
            .add_chunks(&chunks)
            .await
            .map_err(CoachError::storage)?;

        info!(
            document_id = %document_id,
            source = metadata.get(META_SOURCE).map(String::as_str).unwrap_or("unknown"),
            chunks = chunks.len(),
            "document ingested"
        );
        Ok(document_id)
    }
}
