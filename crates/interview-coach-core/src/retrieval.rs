//! Retrieval post-processing: document identity, deduplication, and
//! priority-term re-ranking.
//!
//! Everything here is a pure function over the raw similarity-search
//! output of a [`VectorStore`](crate::store::VectorStore). The app crate's
//! `Retriever` fetches candidates and then calls [`rank_hits`].
//!
//! # Pipeline
//!
//! ```text
//! raw hits (over-fetched, relevance order)
//!   → dedupe_hits          one hit per DocumentIdentity, longest text wins
//!   → partition by terms   hits mentioning a priority term first
//!   → cap each partition   priority_limit / other_limit (or final_limit)
//! ```

use std::collections::HashMap;

use crate::models::{SearchHit, META_DOCUMENT_ID, META_SOURCE, META_URL};

/// Number of leading characters used as identity when a hit has no metadata.
pub const IDENTITY_PREFIX_CHARS: usize = 50;

/// Employer names boosted when they appear in a query.
pub const DEFAULT_PRIORITY_TERMS: &[&str] = &[
    "카카오", "네이버", "라인", "토스", "당근", "쿠팡", "배달의민족", "우아한형제들", "삼성",
    "LG", "SK", "현대", "기아", "한화", "롯데", "CJ", "GS", "당근마켓", "무신사", "야놀자",
    "직방", "왓챠", "브랜디", "마켓컬리", "Kakao", "Naver", "Coupang", "Samsung", "Hyundai",
    "Apple", "Google", "Microsoft", "Amazon", "Meta", "Netflix", "Tesla", "애플", "구글",
    "마이크로소프트", "아마존", "메타", "넷플릭스", "테슬라",
];

/// Logical document a hit belongs to, resolved by priority
/// `url > document_id > source > text prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentIdentity {
    Url(String),
    DocumentId(String),
    Source(String),
    TextPrefix(String),
}

pub fn resolve_identity(hit: &SearchHit) -> DocumentIdentity {
    if let Some(url) = hit.meta(META_URL) {
        DocumentIdentity::Url(url.to_string())
    } else if let Some(id) = hit.meta(META_DOCUMENT_ID) {
        DocumentIdentity::DocumentId(id.to_string())
    } else if let Some(source) = hit.meta(META_SOURCE) {
        DocumentIdentity::Source(source.to_string())
    } else {
        DocumentIdentity::TextPrefix(hit.text.chars().take(IDENTITY_PREFIX_CHARS).collect())
    }
}

/// Keeps one hit per [`DocumentIdentity`].
///
/// The surviving hit sits at the position where its identity first
/// appeared, and is the candidate with the longest text (first one on ties).
pub fn dedupe_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut slots: HashMap<DocumentIdentity, usize> = HashMap::new();
    let mut kept: Vec<SearchHit> = Vec::with_capacity(hits.len());

    for hit in hits {
        let identity = resolve_identity(&hit);
        match slots.get(&identity) {
            Some(&slot) => {
                if hit.text.chars().count() > kept[slot].text.chars().count() {
                    kept[slot] = hit;
                }
            }
            None => {
                slots.insert(identity, kept.len());
                kept.push(hit);
            }
        }
    }
    kept
}

/// Injectable gazetteer of priority terms.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityTerms {
    terms: Vec<String>,
}

impl PriorityTerms {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for term in terms {
            let term = term.into().trim().to_string();
            if !term.is_empty() && !out.iter().any(|t| t.to_lowercase() == term.to_lowercase()) {
                out.push(term);
            }
        }
        Self { terms: out }
    }

    /// A gazetteer that never boosts.
    pub fn none() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Terms of the gazetteer mentioned in `query`, in gazetteer order.
    pub fn extract(&self, query: &str) -> Vec<String> {
        let haystack = query.to_lowercase();
        self.terms
            .iter()
            .filter(|t| contains_term(&haystack, &t.to_lowercase()))
            .cloned()
            .collect()
    }
}

impl Default for PriorityTerms {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY_TERMS.iter().copied())
    }
}

/// Case-folded containment test.
///
/// Both arguments must already be lowercased. ASCII terms must sit on
/// token boundaries (`sk` does not match `ask`); other terms match as
/// plain substrings since Korean names take attached particles.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if !term.is_ascii() {
        return haystack.contains(term);
    }
    haystack.match_indices(term).any(|(start, matched)| {
        let end = start + matched.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_ascii_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_ascii_alphanumeric());
        before_ok && after_ok
    })
}

/// Whether `hit` mentions any of `terms` in its text, url, or source.
pub fn matches_any(hit: &SearchHit, terms: &[String]) -> bool {
    let fields = [
        Some(hit.text.as_str()),
        hit.meta(META_URL),
        hit.meta(META_SOURCE),
    ];
    let fields: Vec<String> = fields.iter().flatten().map(|f| f.to_lowercase()).collect();
    terms.iter().any(|term| {
        let term = term.to_lowercase();
        fields.iter().any(|f| contains_term(f, &term))
    })
}

/// Output caps for [`rank_hits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankLimits {
    /// Cap when the query carries no priority terms.
    pub final_limit: usize,
    /// Cap on hits matching a priority term.
    pub priority_limit: usize,
    /// Cap on the remaining hits when priority terms are present.
    pub other_limit: usize,
}

impl Default for RankLimits {
    fn default() -> Self {
        Self {
            final_limit: 10,
            priority_limit: 10,
            other_limit: 5,
        }
    }
}

/// Dedupes and re-ranks raw search output.
///
/// Without `terms` the result is the deduplicated list capped at
/// `final_limit`. With terms, hits mentioning any term come first (capped
/// at `priority_limit`), followed by the rest (capped at `other_limit`);
/// relevance order is kept inside each group.
pub fn rank_hits(raw: Vec<SearchHit>, terms: &[String], limits: &RankLimits) -> Vec<SearchHit> {
    let unique = dedupe_hits(raw);
    if terms.is_empty() {
        return unique.into_iter().take(limits.final_limit).collect();
    }

    let (priority, other): (Vec<SearchHit>, Vec<SearchHit>) =
        unique.into_iter().partition(|hit| matches_any(hit, terms));
    priority
        .into_iter()
        .take(limits.priority_limit)
        .chain(other.into_iter().take(limits.other_limit))
        .collect()
}
