//! Configuration loader for recall.
//!
//! Reads `config.toml` from the data directory (`~/.recall/` by default) into
//! [`RecallConfig`]. Falls back to defaults when the file is missing or
//! malformed, then applies the environment overrides for the two
//! process-boundary settings.

use std::path::{Path, PathBuf};

use recall_types::config::RecallConfig;

pub const DATA_DIR_ENV: &str = "RECALL_DATA_DIR";
pub const EMBEDDING_PORT_ENV: &str = "RECALL_EMBEDDING_PORT";
pub const VECTOR_URI_ENV: &str = "RECALL_VECTOR_URI";

/// Resolve the data directory: `$RECALL_DATA_DIR`, else `~/.recall`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".recall")
}

/// Load configuration from `{data_dir}/config.toml`.
pub async fn load_config(data_dir: &Path) -> RecallConfig {
    load_config_file(&data_dir.join("config.toml")).await
}

/// Load configuration from an explicit file.
///
/// - Missing file: defaults.
/// - Unreadable or malformed file: logs a warning and returns defaults.
pub async fn load_config_file(config_path: &Path) -> RecallConfig {
    let content = match tokio::fs::read_to_string(config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", config_path.display());
            return RecallConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return RecallConfig::default();
        }
    };

    match toml::from_str::<RecallConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            RecallConfig::default()
        }
    }
}

/// Apply `RECALL_EMBEDDING_PORT` and `RECALL_VECTOR_URI` on top of the file.
pub fn apply_env_overrides(config: &mut RecallConfig) {
    apply_overrides(
        config,
        std::env::var(EMBEDDING_PORT_ENV).ok(),
        std::env::var(VECTOR_URI_ENV).ok(),
    );
}

fn apply_overrides(config: &mut RecallConfig, port: Option<String>, vector_uri: Option<String>) {
    if let Some(port) = port {
        match port.parse::<u16>() {
            Ok(port) => config.embedding.port = port,
            Err(err) => tracing::warn!("Ignoring {EMBEDDING_PORT_ENV}={port}: {err}"),
        }
    }
    if let Some(uri) = vector_uri.filter(|u| !u.is_empty()) {
        config.vector.uri = uri;
    }
}

/// Vector store location: URIs with a scheme and absolute paths are kept,
/// relative paths are joined to the data directory.
pub fn resolve_vector_uri(config: &RecallConfig, data_dir: &Path) -> String {
    let uri = &config.vector.uri;
    if uri.contains("://") || Path::new(uri).is_absolute() {
        uri.clone()
    } else {
        data_dir.join(uri).to_string_lossy().into_owned()
    }
}

/// Text log file, joined to the data directory unless absolute.
pub fn resolve_text_log_path(config: &RecallConfig, data_dir: &Path) -> PathBuf {
    if config.text_log.path.is_absolute() {
        config.text_log.path.clone()
    } else {
        data_dir.join(&config.text_log.path)
    }
}
