//! Error taxonomy for the ingestion and query pipelines.
//!
//! [`PipelineError`] carries the component-level failure kinds. It stays on
//! the server side: the query boundary collapses it into a [`QueryError`]
//! before anything reaches a caller, so upstream detail only ever shows up
//! in logs.

use thiserror::Error;

/// Failure of a single pipeline component.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedding input rejected: {0}")]
    EmbeddingRejected(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("chunk batch write failed: {0}")]
    IngestionWriteFailed(String),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("generation service unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("generation returned no candidate output")]
    GenerationEmpty,

    #[error("source document unavailable: {0}")]
    SourceUnavailable(String),
}

impl PipelineError {
    /// Whether the same call may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::EmbeddingUnavailable(_)
                | PipelineError::IndexUnavailable(_)
                | PipelineError::GenerationUnavailable(_)
        )
    }
}

/// Errors visible to a query caller.
///
/// `Internal` carries no detail; the cause is logged where the error is
/// produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("You must be logged in.")]
    Unauthenticated,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("An error occurred while processing your request.")]
    Internal,
}

impl QueryError {
    /// Wire code used in the RPC error body.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Unauthenticated => "unauthenticated",
            QueryError::InvalidArgument(_) => "invalid-argument",
            QueryError::Internal => "internal",
        }
    }
}
