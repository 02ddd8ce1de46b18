//! Text log trait.
//!
//! An append-only keyed store mapping the integer id it assigns to the
//! original text. Implementations (e.g., SQLite) live in recall-infra.

use recall_types::error::StoreError;

/// Trait for the relational text log.
///
/// Every operation other than `open` and `destroy` fails with
/// `StoreError::Connection` until `open` succeeds.
pub trait TextLog: Send + Sync {
    /// Open or create the backing store.
    fn open(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Close the store and delete its backing file. Missing is not an error.
    fn destroy(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Create the memories table. Fails with `StoreError::Conflict` if it exists.
    fn create_schema(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Whether the memories table exists.
    fn schema_exists(&self) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Append one text and return its engine-assigned id.
    fn insert(&self, text: &str)
    -> impl std::future::Future<Output = Result<i64, StoreError>> + Send;

    /// Append texts in one transaction; ids are returned in input order.
    fn insert_batch(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// Point lookup. A missing id is `StoreError::NotFound`.
    fn lookup(&self, id: i64)
    -> impl std::future::Future<Output = Result<String, StoreError>> + Send;

    /// Remove rows written by an ingestion whose vector write failed.
    fn discard(&self, ids: &[i64])
    -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Every stored id, ascending.
    fn ids(&self) -> impl std::future::Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// Number of stored rows.
    fn count(&self) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;
}
