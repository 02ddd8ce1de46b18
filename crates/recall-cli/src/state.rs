//! Application state: resolved configuration and engine wiring.
//!
//! The engine is generic over its capability traits; `ConcreteEngine` pins it
//! to the infra implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use recall_core::memory::engine::{EngineOptions, MemoryEngine};
use recall_core::retry::RetryPolicy;
use recall_infra::config::{
    apply_env_overrides, load_config, load_config_file, resolve_data_dir, resolve_text_log_path,
    resolve_vector_uri,
};
use recall_infra::embedding::HttpEmbeddingClient;
use recall_infra::sqlite::SqliteTextLog;
use recall_infra::vector::LanceVectorIndex;
use recall_types::config::RecallConfig;

pub type ConcreteEngine = MemoryEngine<HttpEmbeddingClient, LanceVectorIndex, SqliteTextLog>;

pub struct AppState {
    pub config: RecallConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory and load configuration.
    ///
    /// An explicit `config_path` replaces `{data_dir}/config.toml`; a
    /// `data_dir` set in the file wins over the environment.
    pub async fn init(config_path: Option<&Path>) -> Result<Self> {
        let default_dir = resolve_data_dir();
        let mut config = match config_path {
            Some(path) => load_config_file(path).await,
            None => load_config(&default_dir).await,
        };
        apply_env_overrides(&mut config);

        let data_dir = config.data_dir.clone().unwrap_or(default_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        tracing::debug!(data_dir = %data_dir.display(), "configuration loaded");
        Ok(Self { config, data_dir })
    }

    /// Build an engine over the configured adapters. Nothing is started yet.
    pub async fn build_engine(&self) -> Result<ConcreteEngine> {
        let embedder = HttpEmbeddingClient::from_config(&self.config.embedding)
            .context("Failed to create embedding client")?;

        let spec = self
            .config
            .vector
            .collection_spec(self.config.embedding.dimension);
        let uri = resolve_vector_uri(&self.config, &self.data_dir);
        let index = LanceVectorIndex::connect(&uri, spec)
            .await
            .with_context(|| format!("Failed to connect to vector store at {uri}"))?;

        let text_log = SqliteTextLog::new(resolve_text_log_path(&self.config, &self.data_dir));

        let options = EngineOptions {
            index: self.config.vector.index_params(),
            search: self.config.vector.search_params(),
            retry: RetryPolicy::from_config(&self.config.embedding),
        };

        Ok(MemoryEngine::new(embedder, index, text_log, options))
    }
}
