//! Configuration types for recall.
//!
//! `RecallConfig` represents `config.toml` in the data directory. Every field
//! has a default, so an empty file (or no file) yields a working deployment
//! against a local embedding service on port 8600.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::memory::{CollectionSpec, DistanceMetric, IndexParams, SearchParams};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Overrides the data directory resolved from the environment.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub text_log: TextLogConfig,
}

/// External embedding process and its HTTP protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Executable that serves embeddings.
    pub program: String,
    /// Arguments passed before the port, which is always appended last.
    pub args: Vec<String>,
    /// Loopback port the service listens on.
    pub port: u16,
    /// Request path of the embedding endpoint.
    pub path: String,
    /// Length of every vector the service returns.
    pub dimension: usize,
    pub startup_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Total attempts per embedding request (1 = no retry).
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["bertService.py".to_string()],
            port: 8600,
            path: "/bert".to_string(),
            dimension: 768,
            startup_timeout_secs: 120,
            request_timeout_secs: 30,
            max_attempts: 3,
            retry_delay_ms: 200,
            max_retry_delay_ms: 5_000,
        }
    }
}

impl EmbeddingConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Full URL of the embedding endpoint on the loopback interface.
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, self.path)
    }
}

/// Vector engine address, collection, and index/search tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Database location: a directory (relative to the data dir) or a URI.
    pub uri: String,
    pub collection: String,
    pub metric: DistanceMetric,
    pub nlist: u32,
    pub nprobe: usize,
    pub top_k: usize,
    pub min_rows_for_index: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            uri: "vector_store".to_string(),
            collection: "memory_storage".to_string(),
            metric: DistanceMetric::L2,
            nlist: 1024,
            nprobe: 10,
            top_k: 10,
            min_rows_for_index: 256,
        }
    }
}

impl VectorConfig {
    pub fn collection_spec(&self, dimension: usize) -> CollectionSpec {
        CollectionSpec {
            name: self.collection.clone(),
            dimension,
            metric: self.metric,
        }
    }

    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            nlist: self.nlist,
            min_rows: self.min_rows_for_index,
        }
    }

    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            top_k: self.top_k,
            nprobe: self.nprobe,
        }
    }
}

/// Relational text log location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLogConfig {
    /// SQLite file, relative to the data dir unless absolute.
    pub path: PathBuf,
}

impl Default for TextLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mydb.sqlite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = RecallConfig::default();
        assert!(config.data_dir.is_none());
        assert_eq!(config.embedding.port, 8600);
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.embedding.endpoint(), "http://127.0.0.1:8600/bert");
        assert_eq!(config.vector.collection, "memory_storage");
        assert_eq!(config.vector.metric, DistanceMetric::L2);
        assert_eq!(config.vector.top_k, 10);
        assert_eq!(config.text_log.path, PathBuf::from("mydb.sqlite"));
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: RecallConfig = toml::from_str("").unwrap();
        assert_eq!(config.embedding.max_attempts, 3);
        assert_eq!(config.vector.nlist, 1024);
    }

    #[test]
    fn test_config_deserialize_partial_sections() {
        let toml_str = r#"
[embedding]
port = 9000
args = ["serve.py", "--model", "bert-base-chinese"]

[vector]
uri = "/srv/vectors"
metric = "cosine"
top_k = 3
"#;
        let config: RecallConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.embedding.port, 9000);
        assert_eq!(config.embedding.args.len(), 3);
        // Unset fields in a present section keep their defaults
        assert_eq!(config.embedding.path, "/bert");
        assert_eq!(config.vector.uri, "/srv/vectors");
        assert_eq!(config.vector.metric, DistanceMetric::Cosine);
        assert_eq!(config.vector.search_params().top_k, 3);
        assert_eq!(config.vector.search_params().nprobe, 10);
    }

    #[test]
    fn test_collection_spec_from_config() {
        let config = VectorConfig::default();
        let spec = config.collection_spec(768);
        assert_eq!(spec.name, "memory_storage");
        assert_eq!(spec.dimension, 768);
        assert_eq!(spec.metric, DistanceMetric::L2);
    }
}
