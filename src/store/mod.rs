//! Chunk storage and nearest-neighbour search.
//!
//! The [`ChunkStore`] trait is the only seam between the pipelines and
//! persistence. Two backends implement it:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteStore`] | durable store used by the CLI and server |
//! | [`InMemoryStore`] | tests and ephemeral runs |
//!
//! # Distance
//!
//! Vectors are L2-normalised when written, and the query vector is
//! normalised before comparison, so cosine distance is `1 - a·b`. Results
//! are ordered by ascending distance; equal distances keep insertion order.
//!
//! # Dimensionality
//!
//! The first batch written fixes the dimension of the index generation.
//! Later batches and queries with a different dimension fail with
//! [`PipelineError::DimensionMismatch`].

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::embedding::normalize;
use crate::error::PipelineError;
use crate::models::{Chunk, RetrievalResult, RetrievedChunk};

/// One chunk of a batch about to be written.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Durable store of chunk records and their embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put_batch`](ChunkStore::put_batch) | Atomically append all chunks of one document |
/// | [`nearest`](ChunkStore::nearest) | k nearest chunks by cosine distance |
/// | [`count`](ChunkStore::count) | Total stored chunks |
/// | [`dims`](ChunkStore::dims) | Dimension of the current index generation |
/// | [`chunks_for_document`](ChunkStore::chunks_for_document) | Chunks of one document, by index |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Append a document's chunks as one unit.
    ///
    /// `chunk_index` is assigned from the position in `chunks`. Either every
    /// chunk becomes visible or none does. An empty batch is a no-op.
    async fn put_batch(
        &self,
        document_id: &str,
        chunks: &[NewChunk],
    ) -> Result<Vec<Chunk>, PipelineError>;

    /// Return up to `k` chunks ordered by ascending cosine distance to `query`.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<RetrievalResult, PipelineError>;

    async fn count(&self) -> Result<usize, PipelineError>;

    /// `None` until the first batch has been written.
    async fn dims(&self) -> Result<Option<usize>, PipelineError>;

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>, PipelineError>;
}

/// Check a batch before anything is written.
///
/// Returns the batch dimension, or `None` for an empty batch.
pub(crate) fn validate_batch(
    chunks: &[NewChunk],
    existing_dims: Option<usize>,
) -> Result<Option<usize>, PipelineError> {
    let Some(first) = chunks.first() else {
        return Ok(None);
    };
    let dims = first.embedding.len();
    if dims == 0 {
        return Err(PipelineError::IngestionWriteFailed(
            "embedding must not be empty".to_string(),
        ));
    }
    if let Some(expected) = existing_dims {
        if expected != dims {
            return Err(PipelineError::DimensionMismatch {
                expected,
                actual: dims,
            });
        }
    }
    for c in chunks {
        if c.embedding.len() != dims {
            return Err(PipelineError::DimensionMismatch {
                expected: dims,
                actual: c.embedding.len(),
            });
        }
        if c.content.trim().is_empty() {
            return Err(PipelineError::IngestionWriteFailed(
                "chunk content must not be empty".to_string(),
            ));
        }
    }
    Ok(Some(dims))
}

/// Rank normalised candidates against a query vector.
///
/// `candidates` must be in insertion order; the stable sort keeps that order
/// among equal distances.
pub(crate) fn rank<I>(
    candidates: I,
    query: &[f32],
    dims: Option<usize>,
    k: usize,
) -> Result<RetrievalResult, PipelineError>
where
    I: IntoIterator<Item = (Chunk, Vec<f32>)>,
{
    let Some(dims) = dims else {
        return Ok(Vec::new());
    };
    if query.len() != dims {
        return Err(PipelineError::DimensionMismatch {
            expected: dims,
            actual: query.len(),
        });
    }

    let q = normalize(query);
    let mut results: Vec<RetrievedChunk> = candidates
        .into_iter()
        .map(|(chunk, vector)| {
            let dot: f32 = q.iter().zip(vector.iter()).map(|(a, b)| a * b).sum();
            RetrievedChunk {
                chunk,
                distance: 1.0 - dot,
            }
        })
        .collect();

    results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    results.truncate(k);
    Ok(results)
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

    #[test]
    fn test_validate_empty_batch() {
        assert_eq!(validate_batch(&[], Some(3)).unwrap(), None);
    }

    #[test]
    fn test_validate_mixed_dims() {
        let batch = vec![nc("a", vec![1.0, 0.0]), nc("b", vec![1.0, 0.0, 0.0])];
        assert!(matches!(
            validate_batch(&batch, None),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_against_existing_generation() {
        let batch = vec![nc("a", vec![1.0, 0.0])];
        assert!(matches!(
            validate_batch(&batch, Some(3)),
            Err(PipelineError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(validate_batch(&batch, Some(2)).unwrap(), Some(2));
    }

    #[test]
    fn test_validate_rejects_blank_content() {
        let batch = vec![nc("  ", vec![1.0])];
        assert!(matches!(
            validate_batch(&batch, None),
            Err(PipelineError::IngestionWriteFailed(_))
        ));
    }
}
