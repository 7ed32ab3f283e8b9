//! SQLite-backed [`ChunkStore`] implementation.
//!
//! Each batch is written inside one `BEGIN IMMEDIATE` transaction, which
//! takes the write lock before the dimension check reads, so concurrent
//! batches wait on the busy timeout. Dropping the transaction on any error rolls the whole batch back. Embeddings are stored
//! normalised as little-endian `f32` BLOBs and searched brute-force.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{rank, validate_batch, ChunkStore, NewChunk};
use crate::embedding::{blob_to_vec, normalize, vec_to_blob};
use crate::error::PipelineError;
use crate::models::{Chunk, RetrievalResult};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn document_count(&self) -> Result<usize, PipelineError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source_document) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(read_err)?;
        Ok(n as usize)
    }
}

fn read_err(e: sqlx::Error) -> PipelineError {
    PipelineError::IndexUnavailable(e.to_string())
}

fn write_err(e: sqlx::Error) -> PipelineError {
    PipelineError::IngestionWriteFailed(e.to_string())
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let created_ms: i64 = row.get("created_at");
    Chunk {
        id: row.get("id"),
        source_document: row.get("source_document"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_default(),
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn put_batch(
        &self,
        document_id: &str,
        chunks: &[NewChunk],
    ) -> Result<Vec<Chunk>, PipelineError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(write_err)?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT dims FROM chunks LIMIT 1")
            .fetch_optional(&mut *tx)
            .await
            .map_err(write_err)?;
        validate_batch(chunks, existing.map(|d| d as usize))?;

        let now: DateTime<Utc> = Utc::now();
        let mut written = Vec::with_capacity(chunks.len());

        for (i, c) in chunks.iter().enumerate() {
            let chunk = Chunk {
                id: Uuid::new_v4().to_string(),
                source_document: document_id.to_string(),
                chunk_index: i as i64,
                content: c.content.clone(),
                created_at: now,
            };
            let blob = vec_to_blob(&normalize(&c.embedding));

            sqlx::query(
                "INSERT INTO chunks (id, source_document, chunk_index, content, embedding, dims, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.source_document)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&blob)
            .bind(c.embedding.len() as i64)
            .bind(now.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

            written.push(chunk);
        }

        tx.commit().await.map_err(write_err)?;
        Ok(written)
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<RetrievalResult, PipelineError> {
        let rows = sqlx::query(
            "SELECT id, source_document, chunk_index, content, embedding, dims, created_at \
             FROM chunks ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        let dims = rows.first().map(|r| r.get::<i64, _>("dims") as usize);
        let candidates = rows.iter().map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            (row_to_chunk(row), blob_to_vec(&blob))
        });
        rank(candidates, query, dims, k)
    }

    async fn count(&self) -> Result<usize, PipelineError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(read_err)?;
        Ok(n as usize)
    }

    async fn dims(&self) -> Result<Option<usize>, PipelineError> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM chunks LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        Ok(dims.map(|d| d as usize))
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>, PipelineError> {
        let rows = sqlx::query(
            "SELECT id, source_document, chunk_index, content, created_at \
             FROM chunks WHERE source_document = ? ORDER BY seq",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn open(tmp: &TempDir) -> SqliteStore {
        let cfg: Config = toml::from_str(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("m.sqlite").display()
        ))
        .unwrap();
        let pool = db::connect(&cfg).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn nc(content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            content: content.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_put_and_nearest() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;

        assert!(store.nearest(&[1.0, 0.0], 5).await.unwrap().is_empty());

        store
            .put_batch(
                "uploads/a.pdf",
                &[nc("alpha", vec![1.0, 0.0]), nc("beta", vec![0.0, 3.0])],
            )
            .await
            .unwrap();

        let res = store.nearest(&[0.0, 1.0], 5).await.unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].chunk.content, "beta");
        assert!(res[0].distance.abs() < 1e-6);
        assert_eq!(res[1].chunk.chunk_index, 0);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.dims().await.unwrap(), Some(2));
        assert_eq!(store.document_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_batch_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        store
            .put_batch("a", &[nc("first generation", vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = store
            .put_batch("b", &[nc("x", vec![1.0, 0.0, 0.0]), nc("y", vec![0.0, 1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.chunks_for_document("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        store
            .put_batch("a", &[nc("one", vec![2.0, 0.0]), nc("two", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .put_batch("b", &[nc("three", vec![4.0, 0.0])])
            .await
            .unwrap();
        let res = store.nearest(&[1.0, 0.0], 3).await.unwrap();
        let order: Vec<&str> = res.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(order, vec!["one", "two", "three"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batches_all_commit() {
        let tmp = TempDir::new().unwrap();
        let store = std::sync::Arc::new(open(&tmp).await);

        let mut handles = Vec::new();
        for d in 0..24 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let batch: Vec<NewChunk> = (0..15)
                    .map(|i| nc(&format!("doc {} paragraph {}", d, i), vec![1.0, i as f32]))
                    .collect();
                store.put_batch(&format!("uploads/{}.pdf", d), &batch).await
            }));
        }
        for h in handles {
            let written = h.await.unwrap().unwrap();
            assert_eq!(written.len(), 15);
        }

        assert_eq!(store.count().await.unwrap(), 24 * 15);
        assert_eq!(store.document_count().await.unwrap(), 24);
        let chunks = store.chunks_for_document("uploads/7.pdf").await.unwrap();
        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, (0..15).collect::<Vec<i64>>());
    }
}
