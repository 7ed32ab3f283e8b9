//! In-memory [`ChunkStore`] implementation for testing.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. A batch is validated and built
//! outside the vector, then appended under a single write lock, so readers
//! see either none or all of it.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{rank, validate_batch, ChunkStore, NewChunk};
use crate::embedding::normalize;
use crate::error::PipelineError;
use crate::models::{Chunk, RetrievalResult};

struct StoredChunk {
    chunk: Chunk,
    /// Unit-length copy of the embedding.
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryStore {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> PipelineError {
    PipelineError::IndexUnavailable("store lock poisoned".to_string())
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn put_batch(
        &self,
        document_id: &str,
        chunks: &[NewChunk],
    ) -> Result<Vec<Chunk>, PipelineError> {
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| PipelineError::IngestionWriteFailed("store lock poisoned".to_string()))?;

        let existing = stored.first().map(|s| s.vector.len());
        if validate_batch(chunks, existing)?.is_none() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let batch: Vec<StoredChunk> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| StoredChunk {
                chunk: Chunk {
                    id: Uuid::new_v4().to_string(),
                    source_document: document_id.to_string(),
                    chunk_index: i as i64,
                    content: c.content.clone(),
                    created_at: now,
                },
                vector: normalize(&c.embedding),
            })
            .collect();

        let written = batch.iter().map(|s| s.chunk.clone()).collect();
        stored.extend(batch);
        Ok(written)
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<RetrievalResult, PipelineError> {
        let stored = self.chunks.read().map_err(|_| poisoned())?;
        let dims = stored.first().map(|s| s.vector.len());
        rank(
            stored.iter().map(|s| (s.chunk.clone(), s.vector.clone())),
            query,
            dims,
            k,
        )
    }

    async fn count(&self) -> Result<usize, PipelineError> {
        Ok(self.chunks.read().map_err(|_| poisoned())?.len())
    }

    async fn dims(&self) -> Result<Option<usize>, PipelineError> {
        Ok(self
            .chunks
            .read()
            .map_err(|_| poisoned())?
            .first()
            .map(|s| s.vector.len()))
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>, PipelineError> {
        let stored = self.chunks.read().map_err(|_| poisoned())?;
        let mut chunks: Vec<Chunk> = stored
            .iter()
            .filter(|s| s.chunk.source_document == document_id)
            .map(|s| s.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nc(content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            content: content.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_empty_store_nearest_is_empty() {
        let store = InMemoryStore::new();
        let res = store.nearest(&[1.0, 0.0], 5).await.unwrap();
        assert!(res.is_empty());
        assert_eq!(store.dims().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_batch_assigns_contiguous_indices() {
        let store = InMemoryStore::new();
        let written = store
            .put_batch(
                "uploads/a.pdf",
                &[
                    nc("first", vec![1.0, 0.0]),
                    nc("second", vec![0.0, 1.0]),
                    nc("third", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        let indices: Vec<i64> = written.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.dims().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_nearest_sorted_and_bounded() {
        let store = InMemoryStore::new();
        store
            .put_batch(
                "doc",
                &[
                    nc("far", vec![-1.0, 0.0]),
                    nc("near", vec![1.0, 0.1]),
                    nc("mid", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let res = store.nearest(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].chunk.content, "near");
        assert_eq!(res[1].chunk.content, "mid");

        let all = store.nearest(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!((all[2].distance - 2.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = InMemoryStore::new();
        store
            .put_batch("a", &[nc("one", vec![0.0, 2.0])])
            .await
            .unwrap();
        store
            .put_batch("b", &[nc("two", vec![0.0, 1.0]), nc("three", vec![0.0, 5.0])])
            .await
            .unwrap();
        let res = store.nearest(&[0.0, 1.0], 3).await.unwrap();
        let order: Vec<&str> = res.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(order, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let store = InMemoryStore::new();
        let err = store
            .put_batch("doc", &[nc("ok", vec![1.0, 0.0]), nc("bad", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let store = InMemoryStore::new();
        store
            .put_batch("doc", &[nc("x", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        let err = store.nearest(&[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_reingestion_is_additive() {
        let store = InMemoryStore::new();
        for _ in 0..2 {
            store
                .put_batch("uploads/m.pdf", &[nc("same text", vec![1.0])])
                .await
                .unwrap();
        }
        let chunks = store.chunks_for_document("uploads/m.pdf").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_ne!(chunks[0].id, chunks[1].id);
    }
}
