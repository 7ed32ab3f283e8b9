//! API credentials for the external model services.
//!
//! Keys are read from the environment once, when a provider is built, and
//! travel inside the provider from then on. [`ApiKey`] never prints its
//! value, so a stray `{:?}` in a log line cannot leak it.

use anyhow::{bail, Result};
use std::fmt;

#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read the key from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => Ok(Self(v.trim().to_string())),
            _ => bail!("{} environment variable not set", var),
        }
    }

    /// The raw key, for building request headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Resolve the key for a provider: the configured variable name wins,
/// otherwise the provider's conventional one.
pub fn resolve(configured: Option<&str>, provider: &str) -> Result<ApiKey> {
    let var = match configured {
        Some(v) => v,
        None => match provider {
            "gemini" => "GEMINI_API_KEY",
            "openai" => "OPENAI_API_KEY",
            other => bail!("provider '{}' has no default API key variable", other),
        },
    };
    ApiKey::from_env(var)
}
