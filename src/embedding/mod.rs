//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`GeminiEmbedder`]**: calls the Gemini `embedContent` endpoint.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI `/v1/embeddings` endpoint.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: runs models in-process via fastembed (feature
//!   `local-embeddings-fastembed`).
//!
//! Also provides vector utilities used by the chunk stores:
//! - [`normalize`] for unit-length storage
//! - [`vec_to_blob`] / [`blob_to_vec`] for SQLite BLOB storage
//!
//! # Failure classification
//!
//! Every provider issues exactly one upstream request per call:
//! - HTTP 400, 413, 422 → [`PipelineError::EmbeddingRejected`]
//! - any other non-success status, network error or timeout →
//!   [`PipelineError::EmbeddingUnavailable`]
//!
//! Retrying is the caller's business. The ingestion pipeline retries
//! unavailable chunks with backoff; queries never retry.

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;
use crate::secret::{self, ApiKey};

/// Maps text to a fixed-dimension vector.
///
/// Implementations are stateless from the caller's point of view and must be
/// safe to call concurrently.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed one non-empty text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
}

// ============ Disabled ============

/// Used when `embedding.provider = "disabled"`. Every call fails.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
        Err(PipelineError::EmbeddingUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ Gemini ============

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Embedding provider using the Gemini API (`models/{model}:embedContent`).
///
/// The key is sent in the `x-goog-api-key` header rather than the query
/// string so it never appears in request URLs.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    api_key: ApiKey,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = model_and_dims(config)?;
        let api_key = secret::resolve(config.api_key_env.as_deref(), "gemini")?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config.url.as_deref(), GEMINI_BASE_URL),
            model,
            dims,
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        reject_empty(text)?;
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
        });
        let request = self
            .client
            .post(format!("{}/models/{}:embedContent", self.base_url, self.model))
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body);
        let json = send(request).await?;
        let values = json
            .pointer("/embedding/values")
            .ok_or_else(|| malformed("missing embedding.values"))?;
        check_dims(parse_vector(values)?, self.dims)
    }
}

// ============ OpenAI ============

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    api_key: ApiKey,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = model_and_dims(config)?;
        let api_key = secret::resolve(config.api_key_env.as_deref(), "openai")?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config.url.as_deref(), OPENAI_BASE_URL),
            model,
            dims,
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        reject_empty(text)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&body);
        let json = send(request).await?;
        let values = json
            .pointer("/data/0/embedding")
            .ok_or_else(|| malformed("missing data[0].embedding"))?;
        check_dims(parse_vector(values)?, self.dims)
    }
}

// ============ Ollama ============

const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Embedding provider using a local Ollama instance (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = model_and_dims(config)?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config.url.as_deref(), OLLAMA_BASE_URL),
            model,
            dims,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        reject_empty(text)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body);
        let json = send(request).await.map_err(|e| match e {
            PipelineError::EmbeddingUnavailable(msg) => PipelineError::EmbeddingUnavailable(
                format!("{} (is Ollama running at {}?)", msg, self.base_url),
            ),
            other => other,
        })?;
        let values = json
            .pointer("/embeddings/0")
            .ok_or_else(|| malformed("missing embeddings[0]"))?;
        check_dims(parse_vector(values)?, self.dims)
    }
}

// ============ Shared plumbing ============

fn model_and_dims(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", config.provider))?;
    let dims = config
        .dims
        .filter(|d| *d > 0)
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {} provider", config.provider))?;
    Ok((model, dims))
}

/// Configured endpoint, or `default`, without a trailing slash.
pub(crate) fn base_url(url: Option<&str>, default: &str) -> String {
    url.unwrap_or(default).trim_end_matches('/').to_string()
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn reject_empty(text: &str) -> Result<(), PipelineError> {
    if text.trim().is_empty() {
        return Err(PipelineError::EmbeddingRejected(
            "input text is empty".to_string(),
        ));
    }
    Ok(())
}

fn malformed(what: &str) -> PipelineError {
    PipelineError::EmbeddingUnavailable(format!("invalid embedding response: {}", what))
}

/// Send a request and classify the outcome.
async fn send(request: reqwest::RequestBuilder) -> Result<serde_json::Value, PipelineError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            PipelineError::EmbeddingUnavailable(format!("request timed out: {}", e))
        } else {
            PipelineError::EmbeddingUnavailable(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| malformed(&e.to_string()));
    }

    let body_text = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body_text))
}

/// Map a non-success HTTP status to an embedding error kind.
pub fn classify_status(status: StatusCode, body: &str) -> PipelineError {
    let detail = format!("upstream returned {}: {}", status, truncate(body, 300));
    match status {
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNPROCESSABLE_ENTITY => {
            PipelineError::EmbeddingRejected(detail)
        }
        _ => PipelineError::EmbeddingUnavailable(detail),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn parse_vector(values: &serde_json::Value) -> Result<Vec<f32>, PipelineError> {
    let arr = values
        .as_array()
        .ok_or_else(|| malformed("embedding is not an array"))?;
    arr.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| malformed("embedding contains a non-numeric value"))
        })
        .collect()
}

/// Enforce the provider's fixed dimensionality.
pub fn check_dims(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, PipelineError> {
    if vector.len() != expected {
        return Err(PipelineError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Create the appropriate [`Embedder`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"gemini"` | [`GeminiEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "gemini" => Ok(Box::new(GeminiEmbedder::new(config)?)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use manual_assist::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(vec: &[f32]) -> Vec<f32> {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return vec.to_vec();
    }
    vec.iter().map(|x| x / norm).collect()
}
