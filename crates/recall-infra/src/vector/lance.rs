//! LanceDB vector index bound to a single collection.
//!
//! Implements `VectorIndex` from `recall-core`. Rows are `(id, vector)` where
//! the id comes from the text log. Writes go through a freshly opened table
//! handle; searches use the handle captured by the last `load`, so new rows
//! become visible only after the next load.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
};
use futures_util::TryStreamExt;
use lancedb::DistanceType;
use lancedb::index::Index;
use lancedb::index::vector::IvfFlatIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use tokio::sync::RwLock;
use tracing::{debug, info};

use recall_core::memory::vector::VectorIndex;
use recall_types::error::StoreError;
use recall_types::memory::{
    CollectionSpec, DistanceMetric, IndexOutcome, IndexParams, LoadOutcome, SearchHit,
    SearchParams, VectorRecord,
};

use super::schema::{
    DISTANCE_COLUMN, ID_COLUMN, VECTOR_COLUMN, memory_vector_schema, vector_item_field,
};

/// LanceDB-backed [`VectorIndex`].
pub struct LanceVectorIndex {
    db: lancedb::Connection,
    spec: CollectionSpec,
    /// Table handle captured by `load`; `None` until then.
    loaded: RwLock<Option<lancedb::Table>>,
}

impl LanceVectorIndex {
    /// Connect to the database at `uri`.
    ///
    /// A plain path is created as a directory if missing; a URI with a
    /// scheme (`s3://`, `db://`, ...) is passed through to LanceDB as is.
    pub async fn connect(uri: &str, spec: CollectionSpec) -> Result<Self, StoreError> {
        if !uri.contains("://") {
            std::fs::create_dir_all(Path::new(uri)).map_err(|e| {
                StoreError::Connection(format!("Failed to create vector store dir {uri}: {e}"))
            })?;
        }

        let db = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to connect to {uri}: {e}")))?;

        debug!(uri, collection = %spec.name, "connected to vector store");
        Ok(Self {
            db,
            spec,
            loaded: RwLock::new(None),
        })
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    fn dimension(&self) -> Result<i32, StoreError> {
        i32::try_from(self.spec.dimension).map_err(|_| {
            StoreError::InvalidInput(format!("dimension {} is too large", self.spec.dimension))
        })
    }

    fn distance_type(&self) -> DistanceType {
        match self.spec.metric {
            DistanceMetric::L2 => DistanceType::L2,
            DistanceMetric::Cosine => DistanceType::Cosine,
            DistanceMetric::Dot => DistanceType::Dot,
        }
    }

    async fn open_table(&self) -> Result<lancedb::Table, StoreError> {
        match self.db.open_table(&self.spec.name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::Query(format!(
                "Failed to open collection {}: {e}",
                self.spec.name
            ))),
        }
    }

    async fn row_count(table: &lancedb::Table) -> Result<usize, StoreError> {
        table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count rows: {e}")))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.spec.dimension {
            return Err(StoreError::InvalidInput(format!(
                "vector has {} dimensions, collection {} expects {}",
                vector.len(),
                self.spec.name,
                self.spec.dimension
            )));
        }
        Ok(())
    }

    /// Build an Arrow RecordBatch from a slice of records.
    fn build_record_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch, StoreError> {
        let dimension = self.dimension()?;
        let schema = Arc::new(memory_vector_schema(dimension));

        let ids = Int64Array::from_iter_values(records.iter().map(|r| r.id));
        let values = Float32Array::from_iter_values(
            records.iter().flat_map(|r| r.vector.iter().copied()),
        );
        let vectors =
            FixedSizeListArray::try_new(vector_item_field(), dimension, Arc::new(values), None)
                .map_err(|e| StoreError::InvalidInput(format!("Failed to build vectors: {e}")))?;

        RecordBatch::try_new(schema, vec![Arc::new(ids), Arc::new(vectors)])
            .map_err(|e| StoreError::Query(format!("Failed to build record batch: {e}")))
    }

    async fn search_one(
        &self,
        table: &lancedb::Table,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let results = table
            .vector_search(query)
            .map_err(|e| StoreError::Query(format!("Vector search setup failed: {e}")))?
            .distance_type(self.distance_type())
            .nprobes(params.nprobe)
            .limit(params.top_k)
            .select(Select::columns(&[ID_COLUMN]))
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Vector search failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to collect results: {e}")))?;

        let mut hits = Vec::new();
        for batch in &batches {
            let ids = int64_column(batch, ID_COLUMN)?;
            let distances = batch
                .column_by_name(DISTANCE_COLUMN)
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| StoreError::Query("search result has no distances".to_string()))?;

            for i in 0..batch.num_rows() {
                hits.push(SearchHit {
                    id: ids.value(i),
                    score: distances.value(i),
                });
            }
        }

        hits.sort_by(|a, b| a.score.total_cmp(&b.score));
        Ok(hits)
    }
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| StoreError::Query(format!("column {name} missing or not Int64")))
}

impl VectorIndex for LanceVectorIndex {
    async fn create_collection(&self) -> Result<(), StoreError> {
        let schema = Arc::new(memory_vector_schema(self.dimension()?));
        match self
            .db
            .create_empty_table(&self.spec.name, schema)
            .execute()
            .await
        {
            Ok(_) => {
                info!(collection = %self.spec.name, dimension = self.spec.dimension, "collection created");
                Ok(())
            }
            Err(lancedb::Error::TableAlreadyExists { name }) => {
                Err(StoreError::Conflict(format!("collection {name} already exists")))
            }
            Err(e) => Err(StoreError::Query(format!("Failed to create collection: {e}"))),
        }
    }

    async fn drop_collection(&self) -> Result<(), StoreError> {
        self.loaded.write().await.take();
        match self.db.drop_table(&self.spec.name, &[]).await {
            Ok(()) => {
                info!(collection = %self.spec.name, "collection dropped");
                Ok(())
            }
            Err(lancedb::Error::TableNotFound { .. }) => Ok(()),
            Err(e) => Err(StoreError::Query(format!("Failed to drop collection: {e}"))),
        }
    }

    async fn insert(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        for record in records {
            self.check_dimension(&record.vector)?;
        }

        let table = self.open_table().await?;
        let batch = self.build_record_batch(records)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to add vectors: {e}")))?;

        debug!(count = records.len(), "vectors inserted");
        Ok(())
    }

    async fn create_index(&self, params: &IndexParams) -> Result<IndexOutcome, StoreError> {
        let table = self.open_table().await?;
        let rows = Self::row_count(&table).await?;

        if rows < params.min_rows.max(1) {
            debug!(rows, min_rows = params.min_rows, "too few rows for an index");
            return Ok(IndexOutcome::Skipped { rows });
        }

        let partitions = params
            .nlist
            .min(u32::try_from(rows).unwrap_or(u32::MAX))
            .max(1);
        let builder = IvfFlatIndexBuilder::default()
            .distance_type(self.distance_type())
            .num_partitions(partitions);

        table
            .create_index(&[VECTOR_COLUMN], Index::IvfFlat(builder))
            .replace(true)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to build index: {e}")))?;

        info!(rows, partitions, "IVF_FLAT index built");
        Ok(IndexOutcome::Built { partitions })
    }

    async fn load(&self) -> Result<LoadOutcome, StoreError> {
        let mut loaded = self.loaded.write().await;
        let table = match loaded.take() {
            Some(table) => {
                table
                    .checkout_latest()
                    .await
                    .map_err(|e| StoreError::Query(format!("Failed to refresh collection: {e}")))?;
                table
            }
            None => self.open_table().await?,
        };

        let rows = Self::row_count(&table).await?;
        *loaded = Some(table);

        if rows == 0 {
            Ok(LoadOutcome::Empty)
        } else {
            Ok(LoadOutcome::Loaded { rows })
        }
    }

    async fn search(
        &self,
        queries: &[Vec<f32>],
        params: &SearchParams,
    ) -> Result<Vec<Vec<SearchHit>>, StoreError> {
        for query in queries {
            self.check_dimension(query)?;
        }

        let loaded = self.loaded.read().await;
        let table = loaded
            .as_ref()
            .ok_or_else(|| StoreError::NotLoaded(self.spec.name.clone()))?;

        if params.top_k == 0 || Self::row_count(table).await? == 0 {
            return Ok(vec![Vec::new(); queries.len()]);
        }

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            results.push(self.search_one(table, query, params).await?);
        }
        Ok(results)
    }

    async fn ids(&self) -> Result<Vec<i64>, StoreError> {
        let table = self.open_table().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::columns(&[ID_COLUMN]))
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to scan ids: {e}")))?
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to collect ids: {e}")))?;

        let mut ids = Vec::new();
        for batch in &batches {
            let column = int64_column(batch, ID_COLUMN)?;
            ids.extend((0..column.len()).map(|i| column.value(i)));
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let table = self.open_table().await?;
        Ok(Self::row_count(&table).await? as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dimension: usize) -> CollectionSpec {
        CollectionSpec {
            name: "memory_storage".to_string(),
            dimension,
            metric: DistanceMetric::L2,
        }
    }

    fn search_params() -> SearchParams {
        SearchParams {
            top_k: 10,
            nprobe: 10,
        }
    }

    async fn index_in(dir: &tempfile::TempDir, dimension: usize) -> LanceVectorIndex {
        let uri = dir.path().join("vectors");
        LanceVectorIndex::connect(uri.to_str().unwrap(), spec(dimension))
            .await
            .expect("Failed to connect")
    }

    fn record(id: i64, vector: &[f32]) -> VectorRecord {
        VectorRecord {
            id,
            vector: vector.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_create_collection_is_not_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(&dir, 3).await;

        index.create_collection().await.unwrap();
        let err = index.create_collection().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_drop_collection_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(&dir, 3).await;

        index.drop_collection().await.unwrap();
        index.create_collection().await.unwrap();
        index.drop_collection().await.unwrap();
        index.drop_collection().await.unwrap();

        assert!(matches!(index.load().await.unwrap_err(), StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_load_empty_collection_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(&dir, 3).await;
        index.create_collection().await.unwrap();

        assert_eq!(index.load().await.unwrap(), LoadOutcome::Empty);
        let hits = index.search(&[vec![1.0, 0.0, 0.0]], &search_params()).await.unwrap();
        assert_eq!(hits, vec![Vec::<SearchHit>::new()]);
    }

    #[tokio::test]
    async fn test_search_before_load_fails() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(&dir, 3).await;
        index.create_collection().await.unwrap();

        let err = index
            .search(&[vec![1.0, 0.0, 0.0]], &search_params())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotLoaded(_)));
    }

    #[tokio::test]
    async fn test_insert_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(&dir, 3).await;
        index.create_collection().await.unwrap();

        let err = index
            .insert(&[record(1, &[1.0, 0.0, 0.0]), record(2, &[1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_ranks_by_distance_per_query() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(&dir, 3).await;
        index.create_collection().await.unwrap();
        index
            .insert(&[
                record(10, &[1.0, 0.0, 0.0]),
                record(20, &[0.0, 1.0, 0.0]),
                record(30, &[0.9, 0.1, 0.0]),
            ])
            .await
            .unwrap();

        assert_eq!(index.load().await.unwrap(), LoadOutcome::Loaded { rows: 3 });

        let results = index
            .search(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]], &search_params())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);

        let first: Vec<i64> = results[0].iter().map(|h| h.id).collect();
        assert_eq!(first, vec![10, 30, 20]);
        assert_eq!(results[0][0].score, 0.0);
        assert!(results[0].windows(2).all(|w| w[0].score <= w[1].score));

        assert_eq!(results[1][0].id, 20);
    }

    #[tokio::test]
    async fn test_rows_visible_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(&dir, 2).await;
        index.create_collection().await.unwrap();
        index.insert(&[record(1, &[1.0, 1.0])]).await.unwrap();
        index.load().await.unwrap();

        index.insert(&[record(2, &[2.0, 2.0])]).await.unwrap();
        assert_eq!(index.load().await.unwrap(), LoadOutcome::Loaded { rows: 2 });

        let results = index.search(&[vec![2.0, 2.0]], &search_params()).await.unwrap();
        assert_eq!(results[0][0].id, 2);
        assert_eq!(index.ids().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_create_index_skips_small_collections() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(&dir, 2).await;
        index.create_collection().await.unwrap();
        index.insert(&[record(1, &[1.0, 0.0])]).await.unwrap();

        let outcome = index
            .create_index(&IndexParams {
                nlist: 1024,
                min_rows: 256,
            })
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::Skipped { rows: 1 });
    }

    #[tokio::test]
    async fn test_create_index_builds_ivf_flat() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(&dir, 4).await;
        index.create_collection().await.unwrap();

        let records: Vec<VectorRecord> = (0..300)
            .map(|i| {
                let x = i as f32;
                record(i, &[x, x * 0.5, (x * 0.1).sin(), 1.0])
            })
            .collect();
        index.insert(&records).await.unwrap();

        let outcome = index
            .create_index(&IndexParams {
                nlist: 4,
                min_rows: 256,
            })
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::Built { partitions: 4 });

        index.load().await.unwrap();
        let results = index
            .search(&[vec![0.0, 0.0, 0.0, 1.0]], &search_params())
            .await
            .unwrap();
        assert!(!results[0].is_empty());
    }
}
