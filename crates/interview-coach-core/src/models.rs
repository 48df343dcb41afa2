//! Core data models shared by ingestion, retrieval, and generation.
//!
//! Chunk metadata is an opaque string map supplied by the caller. The
//! ingestor adds [`META_DOCUMENT_ID`] and [`META_CHUNK_ID`]; everything
//! else (`source`, `url`, `type`, ...) passes through untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-supplied chunk metadata.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key holding the parent document identifier.
pub const META_DOCUMENT_ID: &str = "document_id";
/// Metadata key holding the chunk identifier (`{document_id}_{ordinal}`).
pub const META_CHUNK_ID: &str = "chunk_id";
/// Metadata key for the human-readable origin label (file name, site, ...).
pub const META_SOURCE: &str = "source";
/// Metadata key for the page URL of crawled documents.
pub const META_URL: &str = "url";
/// Metadata key for the document kind (`web`, `resume`, ...).
pub const META_TYPE: &str = "type";

/// Immutable unit of indexed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `{document_id}_{chunk_index}`.
    pub chunk_id: String,
    pub document_id: String,
    /// Contiguous ordinal starting at 0 within the document.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    /// Caller metadata plus `document_id` and `chunk_id`.
    pub metadata: Metadata,
}

/// One entry of a similarity search, as returned by a
/// [`VectorStore`](crate::store::VectorStore).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Metadata,
    /// Backend similarity score; higher is more relevant.
    pub score: f32,
}

impl SearchHit {
    pub fn new(text: impl Into<String>, metadata: Metadata, score: f32) -> Self {
        Self {
            text: text.into(),
            metadata,
            score,
        }
    }

    /// Returns a metadata value, treating empty strings as absent.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Per-document listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub source: String,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub chunk_count: usize,
}

impl DocumentSummary {
    /// Builds a summary from the metadata of any chunk of the document.
    pub fn from_metadata(id: &str, metadata: &Metadata, chunk_count: usize) -> Self {
        let get = |key: &str| metadata.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            id: id.to_string(),
            source: get(META_SOURCE).unwrap_or_else(|| "unknown".to_string()),
            url: get(META_URL),
            kind: get(META_TYPE).unwrap_or_else(|| "web".to_string()),
            chunk_count,
        }
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Language-neutral label used when rendering history into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a session's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
