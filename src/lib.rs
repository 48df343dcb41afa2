//! # Interview Coach
//!
//! Retrieval-augmented answers for interview preparation: a personal
//! knowledge base (job postings, company pages, your resume) indexed in
//! SQLite, ranked with employer-aware boosting, and fed to a rate-limited,
//! retrying LLM backend that remembers each conversation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Acquisition │──▶│  Ingestor    │──▶│ SQLite vector │
//! │ txt/md/pdf  │   │ split+embed  │   │    store      │
//! └─────────────┘   └──────────────┘   └──────┬────────┘
//!                                             │ similarity search
//!                   ┌──────────────┐   ┌──────▼────────┐
//!   question ──────▶│ Orchestrator │◀──│  Retriever    │
//!                   │ pace + retry │   │ dedup + boost │
//!                   └──────┬───────┘   └───────────────┘
//!                          │ prompt
//!                   ┌──────▼───────┐
//!                   │ LLM backend  │  Anthropic / OpenAI-compatible
//!                   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! coach init
//! coach add ./notes/                 # txt, md and pdf files
//! coach search "Kakao backend"
//! coach ask "How should I introduce myself?" --stream
//! coach serve                         # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Caller-facing error taxonomy |
//! | [`coach`] | Facade over every operation |
//! | [`ingest`] | Document ingestion |
//! | [`retriever`] | Ranked retrieval over a vector store |
//! | [`generate`] | Paced, retried answer generation |
//! | [`rate_limiter`] | Per-key request pacing |
//! | [`llm`] | LLM backends and failure classification |
//! | [`embedding`] | Embedder selection |
//! | [`sqlite_store`] | Persistent vector store |
//! | [`acquisition`] | File and directory sources |
//! | [`server`] | HTTP API |

pub mod acquisition;
pub mod coach;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod prompt;
pub mod rate_limiter;
pub mod retriever;
pub mod server;
pub mod sqlite_store;

pub use coach::Coach;
pub use error::CoachError;
