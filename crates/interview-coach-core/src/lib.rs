//! # Interview Coach Core
//!
//! Runtime-free logic for Interview Coach: data models, the overlapping
//! text splitter, the vector store abstraction, retrieval ranking, and
//! per-session conversation memory.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O. The
//! application crate supplies the persistent store, the HTTP-backed
//! embedders, the rate limiter, and the LLM backends.

pub mod chunk;
pub mod embedding;
pub mod memory;
pub mod models;
pub mod retrieval;
pub mod store;
