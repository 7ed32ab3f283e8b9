//! Answer generation via an external generative model.
//!
//! [`Generator`] is a single request/response call: one prompt in, one
//! answer text out, no streaming. Providers:
//!
//! | Config Value | Provider | Endpoint |
//! |-------------|----------|----------|
//! | `"gemini"` | [`GeminiGenerator`] | `models/{model}:generateContent` |
//! | `"openai"` | [`OpenAIGenerator`] | `/v1/chat/completions` |
//! | `"ollama"` | [`OllamaGenerator`] | `/api/generate` |
//! | `"disabled"` | [`DisabledGenerator`] | none |
//!
//! Transport failures, timeouts and non-success statuses map to
//! [`PipelineError::GenerationUnavailable`]; a well-formed reply without any
//! candidate text maps to [`PipelineError::GenerationEmpty`].

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::embedding::{base_url, http_client};
use crate::error::PipelineError;
use crate::secret::{self, ApiKey};

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError>;
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String, PipelineError> {
        Err(PipelineError::GenerationUnavailable(
            "generation provider is disabled".to_string(),
        ))
    }
}

// ============ Gemini ============

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: ApiKey,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config.url.as_deref(), GEMINI_BASE_URL),
            model: model(config)?,
            api_key: secret::resolve(config.api_key_env.as_deref(), "gemini")?,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        let request = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body);
        let json = send(request).await?;
        parse_gemini_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
pub fn parse_gemini_response(json: &serde_json::Value) -> Result<String, PipelineError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or(PipelineError::GenerationEmpty)?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    non_empty(text)
}

// ============ OpenAI ============

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: ApiKey,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config.url.as_deref(), OPENAI_BASE_URL),
            model: model(config)?,
            api_key: secret::resolve(config.api_key_env.as_deref(), "openai")?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&body);
        let json = send(request).await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or(PipelineError::GenerationEmpty)?;
        non_empty(text.to_string())
    }
}

// ============ Ollama ============

const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config.url.as_deref(), OLLAMA_BASE_URL),
            model: model(config)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let request = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body);
        let json = send(request).await?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or(PipelineError::GenerationEmpty)?;
        non_empty(text.to_string())
    }
}

// ============ Shared plumbing ============

fn model(config: &GenerationConfig) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generation.model required for {} provider", config.provider))
}

fn non_empty(text: String) -> Result<String, PipelineError> {
    if text.trim().is_empty() {
        Err(PipelineError::GenerationEmpty)
    } else {
        Ok(text)
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<serde_json::Value, PipelineError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            PipelineError::GenerationUnavailable(format!("request timed out: {}", e))
        } else {
            PipelineError::GenerationUnavailable(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        let body_text: String = body_text.chars().take(300).collect();
        return Err(PipelineError::GenerationUnavailable(format!(
            "upstream returned {}: {}",
            status, body_text
        )));
    }

    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| PipelineError::GenerationUnavailable(format!("invalid response body: {}", e)))
}

/// Create the appropriate [`Generator`] based on configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
