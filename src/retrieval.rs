//! Retrieval engine: question text to the nearest stored chunks.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::models::RetrievalResult;
use crate::store::ChunkStore;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    top_k: usize,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k,
            timeout,
        }
    }

    /// Embed `question` once and return up to `top_k` chunks, nearest first.
    ///
    /// There is no relevance cutoff: a small corpus returns every chunk.
    /// Nothing here is retried.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult, PipelineError> {
        let vector = self.embedder.embed(question).await?;

        let result = tokio::time::timeout(self.timeout, self.store.nearest(&vector, self.top_k))
            .await
            .map_err(|_| {
                PipelineError::IndexUnavailable(format!(
                    "nearest-neighbour query timed out after {:?}",
                    self.timeout
                ))
            })??;

        debug!(
            hits = result.len(),
            best = result.first().map(|r| r.distance),
            "retrieval complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::store::{InMemoryStore, NewChunk};
    use async_trait::async_trait;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
            Ok(if text.contains("brake") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            })
        }
    }

    struct StalledStore;

    #[async_trait]
    impl ChunkStore for StalledStore {
        async fn put_batch(&self, _: &str, _: &[NewChunk]) -> Result<Vec<Chunk>, PipelineError> {
            Ok(Vec::new())
        }
        async fn nearest(&self, _: &[f32], _: usize) -> Result<RetrievalResult, PipelineError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<usize, PipelineError> {
            Ok(0)
        }
        async fn dims(&self) -> Result<Option<usize>, PipelineError> {
            Ok(None)
        }
        async fn chunks_for_document(&self, _: &str) -> Result<Vec<Chunk>, PipelineError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_retrieve_orders_by_distance() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_batch(
                "uploads/m.pdf",
                &[
                    NewChunk {
                        content: "fuel pump".into(),
                        embedding: vec![0.0, 1.0],
                    },
                    NewChunk {
                        content: "brake shoe".into(),
                        embedding: vec![1.0, 0.0],
                    },
                ],
            )
            .await
            .unwrap();

        let retriever = Retriever::new(Arc::new(AxisEmbedder), store, 5, Duration::from_secs(5));
        let res = retriever.retrieve("replace the brake shoe").await.unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].chunk.content, "brake shoe");
    }

    #[tokio::test]
    async fn test_retrieve_empty_store() {
        let retriever = Retriever::new(
            Arc::new(AxisEmbedder),
            Arc::new(InMemoryStore::new()),
            5,
            Duration::from_secs(5),
        );
        assert!(retriever.retrieve("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_timeout_is_unavailable() {
        let retriever = Retriever::new(
            Arc::new(AxisEmbedder),
            Arc::new(StalledStore),
            5,
            Duration::from_millis(20),
        );
        let err = retriever.retrieve("brake").await.unwrap_err();
        assert!(matches!(err, PipelineError::IndexUnavailable(_)));
        assert!(err.is_retryable());
    }
}
