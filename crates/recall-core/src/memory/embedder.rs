//! Embedder trait for text-to-vector conversion.
//!
//! The embedding generator is an external process with a lifecycle: it must
//! be started and reach readiness before it serves requests. Implementations
//! (the HTTP client driving that process) live in recall-infra.

use recall_types::error::EmbeddingError;
use tokio_util::sync::CancellationToken;

/// Trait for converting text into embedding vectors.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in recall-infra.
pub trait Embedder: Send + Sync {
    /// Launch the generator and wait until it reports readiness.
    ///
    /// Fails on startup timeout, on cancellation, or when the generator exits
    /// before becoming ready. A no-op when already running.
    fn start(
        &self,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<(), EmbeddingError>> + Send;

    /// Embed a single text. Exactly one request per call.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, EmbeddingError>> + Send;

    /// Stop the generator. Safe to call when it is not running.
    fn shutdown(&self) -> impl std::future::Future<Output = ()> + Send;

    /// Whether the generator is started and has not exited.
    fn is_running(&self) -> bool;

    /// The dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}
