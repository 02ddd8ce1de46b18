use thiserror::Error;

/// Legacy numeric code reported by the embedding protocol for a failed call.
pub const TRANSPORT_FAILURE_CODE: i64 = 5000;

/// Errors from the embedding generator: process lifecycle and request protocol.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to spawn embedding process: {0}")]
    Spawn(String),

    #[error("embedding process did not become ready within {secs}s")]
    StartupTimeout { secs: u64 },

    #[error("embedding process startup was cancelled")]
    StartupCancelled,

    #[error("embedding process exited before becoming ready (status: {status})")]
    ExitedBeforeReady { status: String },

    #[error("failed to build embedding client: {0}")]
    Client(String),

    #[error("embedding process is not running")]
    NotRunning,

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("embedding service returned status {status}: {message}")]
    Service { status: i64, message: String },

    #[error("invalid embedding response: {0}")]
    Decode(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbeddingError::Transport { .. })
    }

    /// Numeric status in the embedding protocol's convention.
    pub fn code(&self) -> i64 {
        match self {
            EmbeddingError::Service { status, .. } => *status,
            _ => TRANSPORT_FAILURE_CODE,
        }
    }
}

/// Errors from the vector index and text log adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("collection '{0}' is not loaded")]
    NotLoaded(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors surfaced by the memory engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_transient() {
        let transport = EmbeddingError::Transport {
            message: "connection refused".to_string(),
        };
        assert!(transport.is_transient());
        assert_eq!(transport.code(), TRANSPORT_FAILURE_CODE);

        let service = EmbeddingError::Service {
            status: 4001,
            message: "empty text".to_string(),
        };
        assert!(!service.is_transient());
        assert_eq!(service.code(), 4001);

        let client = EmbeddingError::Client("invalid TLS backend".to_string());
        assert!(!client.is_transient());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
        assert_eq!(
            StoreError::NotLoaded("memory_storage".to_string()).to_string(),
            "collection 'memory_storage' is not loaded"
        );
    }

    #[test]
    fn test_engine_error_wraps_sources() {
        let err: EngineError = StoreError::NotFound.into();
        assert_eq!(err.to_string(), "entity not found");

        let err = EngineError::InvalidState {
            expected: "operational",
            actual: "uninitialized",
        };
        assert!(err.to_string().contains("uninitialized"));
    }
}
