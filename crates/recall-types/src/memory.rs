//! Memory types for recall.
//!
//! A memory is a natural-language snippet stored twice: its original text in
//! the text log and its embedding in the vector index, joined by the integer
//! id the text log assigns.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// The durable unit of memory.
///
/// Neither `origin_text` nor `vector` changes after the record is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub origin_text: String,
    pub vector: Vec<f32>,
}

/// One row of the vector index: the text log id and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: i64,
    pub vector: Vec<f32>,
}

/// A nearest-neighbour hit returned by the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    /// Distance under the collection's metric; smaller is closer.
    pub score: f32,
}

/// A ranked query result joined back to its original text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalledMemory {
    pub id: i64,
    pub origin_text: String,
    pub score: f32,
}

/// Distance metric used by a vector collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    L2,
    Cosine,
    Dot,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::L2 => write!(f, "l2"),
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Dot => write!(f, "dot"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l2" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot" => Ok(DistanceMetric::Dot),
            other => Err(format!("invalid distance metric: '{other}'")),
        }
    }
}

/// Declaration of the single vector collection a deployment uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

/// Parameters for an approximate-nearest-neighbour index build.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexParams {
    /// Number of IVF partitions.
    pub nlist: u32,
    /// Below this row count no index is built and search stays exhaustive.
    pub min_rows: usize,
}

/// Parameters for a similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub top_k: usize,
    /// Number of IVF partitions probed per query.
    pub nprobe: usize,
}

/// Result of an index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IndexOutcome {
    Built { partitions: u32 },
    /// Too few rows to train an index.
    Skipped { rows: usize },
    /// The build failed; search falls back to an exhaustive scan.
    Failed { reason: String },
}

/// Result of loading a collection for search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded { rows: usize },
    /// The collection exists but holds no vectors. Not an error.
    Empty,
    /// Reloading after an ingestion failed; committed records become
    /// searchable at the next successful load.
    Failed { reason: String },
}

/// Pipeline stage at which a single ingestion item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Embed,
    TextLog,
    VectorIndex,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestStage::Embed => write!(f, "embed"),
            IngestStage::TextLog => write!(f, "text_log"),
            IngestStage::VectorIndex => write!(f, "vector_index"),
        }
    }
}

/// An ingestion item that was not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub text: String,
    pub stage: IngestStage,
    pub reason: String,
}

/// Summary of one ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Ids of the records committed to both stores, in input order.
    pub stored: Vec<i64>,
    pub failed: Vec<IngestFailure>,
    pub index: IndexOutcome,
    pub load: LoadOutcome,
}

/// Summary of one query call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// Ranked results, grouped per query text in input order.
    pub memories: Vec<RecalledMemory>,
    /// Query texts whose embedding failed.
    pub skipped_queries: Vec<String>,
    /// Ids returned by the vector index that have no text row.
    pub missing_ids: Vec<i64>,
}

/// Ids present in only one of the two stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub text_only: Vec<i64>,
    pub vector_only: Vec<i64>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.text_only.is_empty() && self.vector_only.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_metric_roundtrip() {
        for metric in [DistanceMetric::L2, DistanceMetric::Cosine, DistanceMetric::Dot] {
            let parsed: DistanceMetric = metric.to_string().parse().unwrap();
            assert_eq!(parsed, metric);
        }
        assert_eq!("L2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_index_outcome_serializes_tagged() {
        let json = serde_json::to_value(IndexOutcome::Skipped { rows: 3 }).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["rows"], 3);
    }

    #[test]
    fn test_integrity_report_consistency() {
        assert!(IntegrityReport::default().is_consistent());
        let report = IntegrityReport {
            text_only: vec![4],
            vector_only: vec![],
        };
        assert!(!report.is_consistent());
    }
}
