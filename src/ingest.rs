//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow for one uploaded document: trigger filter → fetch →
//! extraction → chunking → embedding → one atomic batch write.
//!
//! Failure policy:
//! - extraction failure ends the run; nothing is written and nothing is
//!   retried (re-upload is the recovery path);
//! - an embedding call that stays unavailable after the configured retries,
//!   or is rejected outright, drops that chunk only;
//! - a dimension mismatch or a failed batch write ends the run.
//!
//! Runs triggered by storage events have no caller to report to, so
//! [`IngestionPipeline::handle_event`] logs the outcome and returns it as a
//! value instead of an error.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::extract::{extract_text_blocking, is_pdf};
use crate::models::{IngestReport, SourceDocument, StorageEvent};
use crate::source::DocumentSource;
use crate::store::{ChunkStore, NewChunk};

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub prefix: String,
    pub min_chars: usize,
    pub embed_concurrency: usize,
    pub embed_retries: u32,
    pub backoff: Duration,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            prefix: config.ingest.prefix.clone(),
            min_chars: config.chunking.min_chars,
            embed_concurrency: config.ingest.embed_concurrency.max(1),
            embed_retries: config.ingest.embed_retries,
            backoff: Duration::from_millis(config.ingest.backoff_ms),
        }
    }
}

/// What happened to a storage event.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Wrong prefix or not a PDF.
    Ignored,
    Ingested(IngestReport),
    Failed(PipelineError),
}

pub struct IngestionPipeline {
    source: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    settings: IngestSettings,
}

impl IngestionPipeline {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            embedder,
            store,
            settings,
        }
    }

    /// Whether an event names a PDF under the ingestion prefix.
    pub fn accepts(&self, event: &StorageEvent) -> bool {
        event.name.starts_with(&self.settings.prefix) && is_pdf(&event.content_type)
    }

    /// Process a storage event end to end, logging the outcome.
    pub async fn handle_event(&self, event: &StorageEvent) -> IngestOutcome {
        if !self.accepts(event) {
            debug!(
                bucket = %event.bucket,
                name = %event.name,
                content_type = %event.content_type,
                "not a PDF under the ingestion prefix, skipping"
            );
            return IngestOutcome::Ignored;
        }

        info!(bucket = %event.bucket, name = %event.name, "processing upload");

        let result = match self.source.fetch(&event.bucket, &event.name).await {
            Ok(content) => {
                self.ingest_document(SourceDocument {
                    id: event.name.clone(),
                    content,
                    content_type: event.content_type.clone(),
                })
                .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(report) => {
                info!(
                    document = %report.document_id,
                    written = report.chunks_written,
                    dropped = report.chunks_dropped,
                    "ingestion complete"
                );
                IngestOutcome::Ingested(report)
            }
            Err(e) => {
                error!(document = %event.name, error = %e, "ingestion failed");
                IngestOutcome::Failed(e)
            }
        }
    }

    /// Extract, chunk, embed and store one document.
    pub async fn ingest_document(&self, doc: SourceDocument) -> Result<IngestReport, PipelineError> {
        let text = extract_text_blocking(doc.content, doc.content_type)
            .await
            .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))?;
        self.ingest_text(&doc.id, &text).await
    }

    /// Chunk, embed and store already-extracted text.
    pub async fn ingest_text(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<IngestReport, PipelineError> {
        let chunks = chunk_text(text, self.settings.min_chars);
        info!(document = %document_id, chunks = chunks.len(), "extracted text chunks");

        // `buffered` keeps results in chunk order. Indices rather than
        // `&String` items keep the future `Send` for `tokio::spawn`.
        let embeddings: Vec<Result<Vec<f32>, PipelineError>> = stream::iter(0..chunks.len())
            .map(|i| self.embed_with_retry(&chunks[i]))
            .buffered(self.settings.embed_concurrency)
            .collect()
            .await;

        let mut batch = Vec::with_capacity(chunks.len());
        let mut dropped = 0usize;

        for (position, (content, embedding)) in chunks.iter().zip(embeddings).enumerate() {
            match embedding {
                Ok(embedding) => batch.push(NewChunk {
                    content: content.clone(),
                    embedding,
                }),
                Err(e @ PipelineError::DimensionMismatch { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        document = %document_id,
                        chunk = position,
                        error = %e,
                        "dropping chunk after embedding failure"
                    );
                    dropped += 1;
                }
            }
        }

        let written = self.store.put_batch(document_id, &batch).await?;

        Ok(IngestReport {
            document_id: document_id.to_string(),
            chunks_found: chunks.len(),
            chunks_written: written.len(),
            chunks_dropped: dropped,
        })
    }

    /// Embed one chunk, retrying while the service is unavailable.
    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let mut attempt = 0u32;
        loop {
            match self.embedder.embed(text).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.settings.embed_retries => {
                    // Exponential backoff: base, 2×base, 4×base, ...
                    let delay = self.settings.backoff * (1u32 << attempt.min(5));
                    debug!(attempt, error = %e, ?delay, "embedding unavailable, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
