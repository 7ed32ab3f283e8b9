//! Bearer-token authentication for the query endpoint.
//!
//! Accepted tokens come from an environment variable holding a
//! comma-separated list. Tokens themselves never leave this module; callers
//! see a [`Principal`] whose id is a short SHA-256 fingerprint.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// An authenticated caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.id)
    }
}

impl Principal {
    /// Principal for commands run locally through the CLI.
    pub fn local() -> Self {
        Self {
            id: "local-cli".to_string(),
        }
    }
}

pub struct TokenAuthenticator {
    tokens: HashSet<String>,
}

impl TokenAuthenticator {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Read accepted tokens from `var`. A missing variable yields an
    /// authenticator that rejects everything.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(list) => Ok(Self::new(list.split(','))),
            Err(std::env::VarError::NotPresent) => Ok(Self::new(Vec::<String>::new())),
            Err(e) => anyhow::bail!("{} is not valid unicode: {}", var, e),
        }
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Resolve an `Authorization` header value to a principal.
    pub fn authenticate(&self, header: Option<&str>) -> Option<Principal> {
        let token = header?.strip_prefix("Bearer ")?.trim();
        if token.is_empty() || !self.tokens.contains(token) {
            return None;
        }
        Some(Principal {
            id: fingerprint(token),
        })
    }
}

fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)[..16].to_string()
}
