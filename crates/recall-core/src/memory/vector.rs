//! Vector index trait.
//!
//! A thin capability interface over a vector similarity engine, bound to a
//! single collection. Implementations (e.g., LanceDB) live in recall-infra.

use recall_types::error::StoreError;
use recall_types::memory::{
    IndexOutcome, IndexParams, LoadOutcome, SearchHit, SearchParams, VectorRecord,
};

/// Trait for a vector collection with approximate nearest-neighbour search.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait VectorIndex: Send + Sync {
    /// Declare the collection. Fails with `StoreError::Conflict` if it exists.
    fn create_collection(
        &self,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete the collection and every vector in it. Missing is not an error.
    fn drop_collection(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Append a batch of (id, vector) pairs in one write.
    fn insert(
        &self,
        records: &[VectorRecord],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Build the ANN index over the vector field.
    fn create_index(
        &self,
        params: &IndexParams,
    ) -> impl std::future::Future<Output = Result<IndexOutcome, StoreError>> + Send;

    /// Make the collection's current contents searchable.
    ///
    /// An empty collection yields `LoadOutcome::Empty`, which callers must
    /// not treat as fatal.
    fn load(&self) -> impl std::future::Future<Output = Result<LoadOutcome, StoreError>> + Send;

    /// Search the loaded collection; one ranked hit list per query vector,
    /// closest first.
    fn search(
        &self,
        queries: &[Vec<f32>],
        params: &SearchParams,
    ) -> impl std::future::Future<Output = Result<Vec<Vec<SearchHit>>, StoreError>> + Send;

    /// Every id stored in the collection.
    fn ids(&self) -> impl std::future::Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// Number of stored vectors.
    fn count(&self) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;
}
