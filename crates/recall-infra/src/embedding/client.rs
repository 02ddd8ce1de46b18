//! HTTP client for the embedding service.
//!
//! Implements [`Embedder`] from `recall-core`. One `POST {endpoint}` per text
//! with body `{"text": ...}`; the service answers
//! `{"status": int, "vector": [f32], "message"?: string}` where a status in
//! the 2000s means success.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use recall_core::memory::embedder::Embedder;
use recall_types::config::EmbeddingConfig;
use recall_types::error::EmbeddingError;

use super::process::EmbeddingProcess;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    status: i64,
    #[serde(default)]
    vector: Vec<f32>,
    #[serde(default)]
    message: Option<String>,
}

/// Embedding client bound to a supervised service process.
pub struct HttpEmbeddingClient {
    process: EmbeddingProcess,
    http: reqwest::Client,
    endpoint: String,
    dimension: usize,
}

impl HttpEmbeddingClient {
    pub fn new(
        process: EmbeddingProcess,
        endpoint: impl Into<String>,
        dimension: usize,
        request_timeout: std::time::Duration,
    ) -> Result<Self, EmbeddingError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| EmbeddingError::Client(e.to_string()))?;

        Ok(Self {
            process,
            http,
            endpoint: endpoint.into(),
            dimension,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        Self::new(
            EmbeddingProcess::from_config(config),
            config.endpoint(),
            config.dimension,
            config.request_timeout(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Embedder for HttpEmbeddingClient {
    async fn start(&self, cancel: &CancellationToken) -> Result<(), EmbeddingError> {
        self.process.start(cancel).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if !self.process.is_running() {
            return Err(EmbeddingError::NotRunning);
        }

        debug!(endpoint = %self.endpoint, chars = text.chars().count(), "embedding request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(transport)?;
        let body = response.bytes().await.map_err(transport)?;

        decode_response(&body, self.dimension)
    }

    async fn shutdown(&self) {
        self.process.shutdown().await;
    }

    fn is_running(&self) -> bool {
        self.process.is_running()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn transport(e: reqwest::Error) -> EmbeddingError {
    EmbeddingError::Transport {
        message: e.to_string(),
    }
}

/// Decode a service response and check the vector length.
fn decode_response(body: &[u8], dimension: usize) -> Result<Vec<f32>, EmbeddingError> {
    let response: EmbedResponse =
        serde_json::from_slice(body).map_err(|e| EmbeddingError::Decode(e.to_string()))?;

    if !(2000..3000).contains(&response.status) {
        return Err(EmbeddingError::Service {
            status: response.status,
            message: response.message.unwrap_or_default(),
        });
    }

    if response.vector.len() != dimension {
        return Err(EmbeddingError::Dimension {
            expected: dimension,
            actual: response.vector.len(),
        });
    }

    Ok(response.vector)
}
