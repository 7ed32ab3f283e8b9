//! Core data models used throughout manual-assist.
//!
//! These types represent the documents, chunks, conversation turns and
//! query results that flow through the ingestion and query pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded document as delivered by the storage layer.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Storage path, e.g. `uploads/uid-1700000000-manual.pdf`.
    pub id: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

/// Notification that an object has finished uploading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEvent {
    pub bucket: String,
    pub name: String,
    pub content_type: String,
}

/// A stored chunk of a document's extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub source_document: String,
    pub chunk_index: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A chunk paired with its cosine distance to the query vector.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Nearest chunks in ascending distance order.
pub type RetrievalResult = Vec<RetrievedChunk>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of the caller-owned conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of the query RPC. History is ordered most-recent-last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

/// Body of a successful query RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    /// Chunks that survived the length filter.
    pub chunks_found: usize,
    pub chunks_written: usize,
    /// Chunks whose embedding failed after retries.
    pub chunks_dropped: usize,
}
