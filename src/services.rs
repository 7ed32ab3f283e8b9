//! Long-lived service handles shared by the CLI and the HTTP server.
//!
//! [`Services::init`] opens the database, runs migrations, builds the
//! provider clients and reads secrets exactly once. Handlers receive the
//! result behind an `Arc` and never construct clients themselves.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::TokenAuthenticator;
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::generation::{create_generator, Generator};
use crate::ingest::{IngestSettings, IngestionPipeline};
use crate::migrate;
use crate::prompt::DEFAULT_INSTRUCTIONS;
use crate::query::QueryOrchestrator;
use crate::retrieval::Retriever;
use crate::source::{DocumentSource, FsDocumentSource};
use crate::store::{ChunkStore, SqliteStore};

pub struct Services {
    store: Arc<dyn ChunkStore>,
    pipeline: Arc<IngestionPipeline>,
    orchestrator: QueryOrchestrator,
    authenticator: TokenAuthenticator,
}

impl Services {
    /// Build every handle from configuration and check that the stored
    /// index matches the configured embedding model.
    pub async fn init(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store: Arc<dyn ChunkStore> = Arc::new(SqliteStore::new(pool));

        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
        let generator: Arc<dyn Generator> = Arc::from(create_generator(&config.generation)?);

        if config.embedding.is_enabled() {
            if let Some(stored) = store.dims().await? {
                if stored != embedder.dims() {
                    bail!(
                        "Index holds {}-dimensional vectors but embedding model '{}' produces {}. \
                         Re-create the database to switch models.",
                        stored,
                        embedder.model_name(),
                        embedder.dims()
                    );
                }
            }
        } else {
            warn!("embedding provider is disabled; ingestion and queries will fail");
        }

        let authenticator = TokenAuthenticator::from_env(&config.auth.tokens_env)?;
        if authenticator.token_count() == 0 {
            warn!(
                var = %config.auth.tokens_env,
                "no API tokens configured; every query will be rejected"
            );
        }

        info!(
            embedding = %embedder.model_name(),
            generation = %generator.model_name(),
            "services initialised"
        );

        Ok(Self::from_parts(
            config,
            Arc::new(FsDocumentSource::new(config.storage.root.clone())),
            embedder,
            store,
            generator,
            authenticator,
        ))
    }

    /// Assemble services from already-built parts.
    pub fn from_parts(
        config: &Config,
        source: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        generator: Arc<dyn Generator>,
        authenticator: TokenAuthenticator,
    ) -> Self {
        let pipeline = Arc::new(IngestionPipeline::new(
            source,
            embedder.clone(),
            store.clone(),
            IngestSettings::from_config(config),
        ));

        let retriever = Retriever::new(
            embedder,
            store.clone(),
            config.retrieval.top_k,
            Duration::from_secs(config.retrieval.timeout_secs),
        );
        let instructions = config
            .generation
            .instructions
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string());

        Self {
            store,
            pipeline,
            orchestrator: QueryOrchestrator::new(retriever, generator, instructions),
            authenticator,
        }
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    pub fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }

    pub fn authenticator(&self) -> &TokenAuthenticator {
        &self.authenticator
    }
}
