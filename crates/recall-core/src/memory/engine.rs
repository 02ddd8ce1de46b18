//! Memory engine: the ingestion and query pipelines over two stores.
//!
//! The engine owns an [`Embedder`], a [`VectorIndex`], and a [`TextLog`] and
//! keeps them in step. The text log assigns every record's id; the same id,
//! unmodified, keys the record's vector. Ingestion writes the text log first
//! and compensates (deletes the fresh rows) when the vector write fails, so
//! after every ingestion call both stores hold the same id set.

use std::collections::BTreeSet;
use std::fmt;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use recall_types::error::{EmbeddingError, EngineError, StoreError};
use recall_types::memory::{
    IndexOutcome, IndexParams, IngestFailure, IngestReport, IngestStage, IntegrityReport,
    LoadOutcome, QueryOutcome, RecalledMemory, SearchParams, VectorRecord,
};

use super::embedder::Embedder;
use super::text_log::TextLog;
use super::vector::VectorIndex;
use crate::retry::RetryPolicy;

/// Lifecycle state of a [`MemoryEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    EmbeddingReady,
    Resetting,
    Operational,
}

impl EngineState {
    fn as_str(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::EmbeddingReady => "embedding_ready",
            EngineState::Resetting => "resetting",
            EngineState::Operational => "operational",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning knobs for the pipelines.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub index: IndexParams,
    pub search: SearchParams,
    /// Applied to every embedding request.
    pub retry: RetryPolicy,
}

/// Orchestrates the embedder and both stores.
///
/// Generic over the capability traits so tests can substitute in-memory
/// fakes. The engine is the only writer to either store.
pub struct MemoryEngine<E: Embedder, V: VectorIndex, T: TextLog> {
    embedder: E,
    index: V,
    text_log: T,
    options: EngineOptions,
    state: EngineState,
}

impl<E: Embedder, V: VectorIndex, T: TextLog> MemoryEngine<E, V, T> {
    pub fn new(embedder: E, index: V, text_log: T, options: EngineOptions) -> Self {
        Self {
            embedder,
            index,
            text_log,
            options,
            state: EngineState::Uninitialized,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn transition(&mut self, next: EngineState) {
        debug!(from = %self.state, to = %next, "engine state transition");
        self.state = next;
    }

    fn require_operational(&self) -> Result<(), EngineError> {
        if self.state == EngineState::Operational {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                expected: EngineState::Operational.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    /// Start against pre-existing data.
    ///
    /// `Uninitialized -> EmbeddingReady -> Operational`. On failure the
    /// engine returns to `Uninitialized`.
    #[tracing::instrument(skip_all)]
    pub async fn bootstrap(&mut self, cancel: &CancellationToken) -> Result<(), EngineError> {
        if self.state != EngineState::Uninitialized {
            return Err(EngineError::InvalidState {
                expected: EngineState::Uninitialized.as_str(),
                actual: self.state.as_str(),
            });
        }

        let result = self.open_existing(cancel).await;
        match &result {
            Ok(()) => {
                self.transition(EngineState::Operational);
                info!("memory engine operational");
            }
            Err(e) => {
                warn!("bootstrap failed: {e}");
                self.transition(EngineState::Uninitialized);
            }
        }
        result
    }

    async fn open_existing(&mut self, cancel: &CancellationToken) -> Result<(), EngineError> {
        self.embedder.start(cancel).await?;
        self.transition(EngineState::EmbeddingReady);

        match self.index.load().await? {
            LoadOutcome::Loaded { rows } => info!(rows, "vector collection loaded"),
            LoadOutcome::Empty => {
                info!("vector collection is empty; nothing is searchable until the first ingest")
            }
            LoadOutcome::Failed { reason } => return Err(StoreError::Query(reason).into()),
        }

        self.text_log.open().await?;
        if !self.text_log.schema_exists().await? {
            warn!("text log has no memories table");
            return Err(StoreError::NotFound.into());
        }
        Ok(())
    }

    /// Start from a clean slate, destroying every stored memory.
    ///
    /// `Uninitialized | Operational -> Resetting -> Operational`. On failure
    /// the engine returns to `Uninitialized`.
    #[tracing::instrument(skip_all)]
    pub async fn reset_and_bootstrap(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if !matches!(
            self.state,
            EngineState::Uninitialized | EngineState::Operational
        ) {
            return Err(EngineError::InvalidState {
                expected: "uninitialized or operational",
                actual: self.state.as_str(),
            });
        }

        if let Err(e) = self.embedder.start(cancel).await {
            self.transition(EngineState::Uninitialized);
            return Err(e.into());
        }

        self.transition(EngineState::Resetting);
        let result = self.recreate_stores().await;
        match &result {
            Ok(()) => {
                self.transition(EngineState::Operational);
                info!("memory engine reset and operational");
            }
            Err(e) => {
                error!("reset failed: {e}");
                self.transition(EngineState::Uninitialized);
            }
        }
        result
    }

    async fn recreate_stores(&self) -> Result<(), EngineError> {
        self.index.drop_collection().await?;
        self.index.create_collection().await?;
        let load = self.index.load().await?;
        debug!(?load, "fresh collection loaded");

        self.text_log.destroy().await?;
        self.text_log.open().await?;
        self.text_log.create_schema().await?;
        Ok(())
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.options
            .retry
            .run(|| self.embedder.embed(text), EmbeddingError::is_transient)
            .await
    }

    /// Store a batch of texts in both stores, then rebuild and reload the
    /// index so the new records become searchable.
    ///
    /// Items whose embedding or store write fails are skipped and listed in
    /// the report; the rest of the batch continues.
    #[tracing::instrument(skip_all, fields(batch = texts.len()))]
    pub async fn ingest(&self, texts: &[String]) -> Result<IngestReport, EngineError> {
        self.require_operational()?;

        let mut failed = Vec::new();
        let mut embedded: Vec<(String, Vec<f32>)> = Vec::with_capacity(texts.len());

        for text in texts {
            match self.embed_with_retry(text).await {
                Ok(vector) => embedded.push((text.clone(), vector)),
                Err(e) => {
                    warn!(code = e.code(), "skipping text, embedding failed: {e}");
                    failed.push(IngestFailure {
                        text: text.clone(),
                        stage: IngestStage::Embed,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let stored = if embedded.is_empty() {
            Vec::new()
        } else {
            self.commit(embedded, &mut failed).await
        };

        let index = self.rebuild_index().await;
        let load = self.reload_index().await;

        info!(
            stored = stored.len(),
            failed = failed.len(),
            ?index,
            ?load,
            "ingestion finished"
        );

        Ok(IngestReport {
            stored,
            failed,
            index,
            load,
        })
    }

    /// Write embedded texts to the text log, then their vectors to the index.
    ///
    /// Returns the committed ids. When the vector write fails the text rows
    /// written here are discarded again.
    async fn commit(
        &self,
        embedded: Vec<(String, Vec<f32>)>,
        failed: &mut Vec<IngestFailure>,
    ) -> Vec<i64> {
        let (texts, vectors): (Vec<String>, Vec<Vec<f32>>) = embedded.into_iter().unzip();

        let ids = match self.text_log.insert_batch(&texts).await {
            Ok(ids) if ids.len() == texts.len() => ids,
            Ok(ids) => {
                error!(
                    expected = texts.len(),
                    actual = ids.len(),
                    "text log returned wrong number of ids"
                );
                let reason = format!(
                    "text log returned {} ids for {} texts",
                    ids.len(),
                    texts.len()
                );
                let stage = self.compensate(&ids, &reason).await;
                record_failures(failed, texts, stage, &reason);
                return Vec::new();
            }
            Err(e) => {
                warn!("text log write failed: {e}");
                record_failures(failed, texts, IngestStage::TextLog, &e.to_string());
                return Vec::new();
            }
        };

        let records: Vec<VectorRecord> = ids
            .iter()
            .zip(vectors)
            .map(|(&id, vector)| VectorRecord { id, vector })
            .collect();

        match self.index.insert(&records).await {
            Ok(()) => {
                debug!(count = ids.len(), "records committed to both stores");
                ids
            }
            Err(e) => {
                warn!("vector index write failed: {e}");
                let reason = e.to_string();
                let stage = self.compensate(&ids, &reason).await;
                record_failures(failed, texts, stage, &reason);
                Vec::new()
            }
        }
    }

    /// Remove text rows whose vectors were never written.
    ///
    /// Returns the stage to blame: `VectorIndex` when the rows are gone,
    /// `TextLog` when they are left behind as orphans.
    async fn compensate(&self, ids: &[i64], cause: &str) -> IngestStage {
        if ids.is_empty() {
            return IngestStage::VectorIndex;
        }
        match self.text_log.discard(ids).await {
            Ok(()) => {
                info!(count = ids.len(), "discarded text rows after failed vector write");
                IngestStage::VectorIndex
            }
            Err(e) => {
                error!(
                    ?ids,
                    "compensating delete failed, text rows are orphaned ({cause}): {e}"
                );
                IngestStage::TextLog
            }
        }
    }

    async fn rebuild_index(&self) -> IndexOutcome {
        match self.index.create_index(&self.options.index).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("index build failed, search stays exhaustive: {e}");
                IndexOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Reload after a commit. The records are already in both stores, so a
    /// failure here is reported instead of failing the ingestion.
    async fn reload_index(&self) -> LoadOutcome {
        match self.index.load().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("reload after ingestion failed, new records not yet searchable: {e}");
                LoadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Find the stored memories closest to each query text.
    ///
    /// Query texts whose embedding fails are skipped. Hits whose id has no
    /// text row are left out of the results and reported in `missing_ids`.
    #[tracing::instrument(skip_all, fields(queries = texts.len()))]
    pub async fn query(&self, texts: &[String]) -> Result<QueryOutcome, EngineError> {
        self.require_operational()?;

        let embeddings = join_all(texts.iter().map(|text| self.embed_with_retry(text))).await;

        let mut vectors = Vec::with_capacity(texts.len());
        let mut skipped_queries = Vec::new();
        for (text, result) in texts.iter().zip(embeddings) {
            match result {
                Ok(vector) => vectors.push(vector),
                Err(e) => {
                    warn!(code = e.code(), "skipping query text, embedding failed: {e}");
                    skipped_queries.push(text.clone());
                }
            }
        }

        if vectors.is_empty() {
            return Ok(QueryOutcome {
                skipped_queries,
                ..Default::default()
            });
        }

        let hit_lists = self.index.search(&vectors, &self.options.search).await?;

        let mut memories = Vec::new();
        let mut missing_ids = Vec::new();
        for hit in hit_lists.into_iter().flatten() {
            match self.text_log.lookup(hit.id).await {
                Ok(origin_text) => memories.push(RecalledMemory {
                    id: hit.id,
                    origin_text,
                    score: hit.score,
                }),
                Err(StoreError::NotFound) => {
                    warn!(id = hit.id, "vector hit has no text row");
                    missing_ids.push(hit.id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            results = memories.len(),
            missing = missing_ids.len(),
            "query finished"
        );

        Ok(QueryOutcome {
            memories,
            skipped_queries,
            missing_ids,
        })
    }

    /// Compare the id sets of both stores.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, EngineError> {
        self.require_operational()?;

        let text_ids: BTreeSet<i64> = self.text_log.ids().await?.into_iter().collect();
        let vector_ids: BTreeSet<i64> = self.index.ids().await?.into_iter().collect();

        let report = IntegrityReport {
            text_only: text_ids.difference(&vector_ids).copied().collect(),
            vector_only: vector_ids.difference(&text_ids).copied().collect(),
        };
        if !report.is_consistent() {
            warn!(
                text_only = report.text_only.len(),
                vector_only = report.vector_only.len(),
                "stores have diverged"
            );
        }
        Ok(report)
    }

    /// Stop the embedding generator and return to `Uninitialized`.
    pub async fn shutdown(&mut self) {
        self.embedder.shutdown().await;
        self.transition(EngineState::Uninitialized);
    }
}

fn record_failures(
    failed: &mut Vec<IngestFailure>,
    texts: Vec<String>,
    stage: IngestStage,
    reason: &str,
) {
    failed.extend(texts.into_iter().map(|text| IngestFailure {
        text,
        stage,
        reason: reason.to_string(),
    }));
}
