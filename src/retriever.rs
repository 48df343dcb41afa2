//! Query-time retrieval over a [`VectorStore`].
//!
//! Over-fetches `candidate_k` hits, then hands them to
//! [`rank_hits`] for identity dedup and priority-term re-ranking. When the
//! query names priority terms, they are also appended to the text sent to
//! the store so the embedding leans toward those documents.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use interview_coach_core::models::SearchHit;
use interview_coach_core::retrieval::{rank_hits, PriorityTerms, RankLimits};
use interview_coach_core::store::VectorStore;

use crate::config::RetrievalConfig;

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    terms: PriorityTerms,
    candidate_k: usize,
    limits: RankLimits,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        terms: PriorityTerms,
        candidate_k: usize,
        limits: RankLimits,
    ) -> Self {
        Self {
            store,
            terms,
            candidate_k,
            limits,
        }
    }

    pub fn from_config(store: Arc<dyn VectorStore>, config: &RetrievalConfig) -> Self {
        Self::new(
            store,
            PriorityTerms::new(config.priority_terms.iter().cloned()),
            config.candidate_k,
            RankLimits {
                final_limit: config.final_limit,
                priority_limit: config.priority_limit,
                other_limit: config.other_limit,
            },
        )
    }

    /// Ranked hits for `query`; store failures are returned to the caller.
    ///
    /// `limit` caps the final result. A limit above the configured caps
    /// widens both the over-fetch and the ranking caps to match.
    pub async fn try_search(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        let terms = self.terms.extract(query);
        let query_text = if terms.is_empty() {
            query.to_string()
        } else {
            format!("{} {}", query, terms.join(" "))
        };

        let wanted = limit.unwrap_or(0);
        let fetch = self.candidate_k.max(wanted);
        let raw = self.store.similarity_search(&query_text, fetch).await?;
        let raw_count = raw.len();

        let limits = RankLimits {
            final_limit: self.limits.final_limit.max(wanted),
            priority_limit: self.limits.priority_limit.max(wanted),
            other_limit: self.limits.other_limit.max(wanted),
        };
        let mut hits = rank_hits(raw, &terms, &limits);
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        debug!(
            query,
            priority_terms = ?terms,
            candidates = raw_count,
            returned = hits.len(),
            "retrieval complete"
        );
        Ok(hits)
    }

    /// Like [`try_search`](Self::try_search) but degrades to no context:
    /// store failures are logged and yield an empty result.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<SearchHit> {
        match self.try_search(query, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "retrieval failed; continuing without context");
                Vec::new()
            }
        }
    }
}
