//! SQLite-backed [`VectorStore`].
//!
//! Chunks live in `chunks` (text, hash, metadata JSON) and their vectors in
//! `chunk_vectors` (little-endian f32 BLOBs tagged with the embedder model).
//! Search is brute-force cosine similarity over the vectors of the current
//! model; vectors written by a different model are ignored.

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use interview_coach_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use interview_coach_core::models::{DocumentChunk, DocumentSummary, Metadata, SearchHit};
use interview_coach_core::store::VectorStore;

use crate::{db, migrate};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }

    /// Connects to `db_path`, applies migrations, and wraps the pool.
    pub async fn open(db_path: &std::path::Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let pool = db::connect(db_path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool, embedder))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_metadata(json: &str) -> Metadata {
    serde_json::from_str(json).unwrap_or_default()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await.context("Embedding failed")?;
        ensure!(
            vectors.len() == chunks.len(),
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        );

        let now = chrono::Utc::now().timestamp();
        let model = self.embedder.model_name();
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, hash, metadata_json, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(&metadata_json)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, embedding)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.document_id)
            .bind(model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .context("Embedding query failed")?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

        let rows = sqlx::query(
            r#"
            SELECT c.text, c.metadata_json, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            WHERE cv.model = ?
            "#,
        )
        .bind(self.embedder.model_name())
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(&query_vec, &blob_to_vec(&blob));
                let metadata_json: String = row.get("metadata_json");
                SearchHit::new(row.get::<String, _>("text"), parse_metadata(&metadata_json), score)
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT c.document_id, c.metadata_json, counts.n AS chunk_count
            FROM chunks c
            JOIN (
                SELECT document_id, COUNT(*) AS n, MIN(created_at) AS first_seen
                FROM chunks
                GROUP BY document_id
            ) counts ON counts.document_id = c.document_id
            WHERE c.chunk_index = 0
            ORDER BY counts.first_seen ASC, c.document_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let id: String = row.get("document_id");
                let metadata_json: String = row.get("metadata_json");
                let count: i64 = row.get("chunk_count");
                DocumentSummary::from_metadata(&id, &parse_metadata(&metadata_json), count as usize)
            })
            .collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted as usize)
    }
}
