//! Namespaced vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the storage operations the
//! pipeline needs: idempotent namespace creation, batched upsert, and
//! top-k similarity query with metadata filtering. Backends are
//! pluggable so tests can run against the in-memory store while the
//! CLI uses SQLite.
//!
//! Implementations must be `Send + Sync` to work with async runtimes,
//! and are assumed to provide their own concurrency control; the core
//! treats them as opaque transactional services.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, dot_product};
use crate::error::Result;
use crate::models::{IndexedRecord, RetrievalMatch};

/// Similarity metric configured per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Dot,
}

impl Metric {
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Dot => dot_product(a, b),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Dot => write!(f, "dot"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            _ => Err(format!("invalid metric: {}", s)),
        }
    }
}

/// Structured filter applied at query time.
///
/// Every `Some` field must match the record's metadata for the record
/// to be a candidate.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub section: Option<String>,
    pub source_id: Option<String>,
}

impl MetadataFilter {
    pub fn matches(&self, record: &IndexedRecord) -> bool {
        if let Some(section) = &self.section {
            if &record.metadata.section != section {
                return false;
            }
        }
        if let Some(source_id) = &self.source_id {
            if &record.metadata.source_id != source_id {
                return false;
            }
        }
        true
    }
}

/// Outcome of a fully successful batched upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    pub batches_applied: usize,
    pub records_applied: usize,
}

/// Abstract namespaced similarity store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotently create a namespace. Fails with
    /// [`crate::Error::DimensionMismatch`] if the namespace exists with
    /// a different dimension.
    async fn ensure_namespace(&self, name: &str, dimension: usize, metric: Metric) -> Result<()>;

    /// Upsert records in batches of `batch_size`, each batch applied
    /// atomically. On a batch failure, reports the failed batch index
    /// and how many batches were already applied; it never continues
    /// past a failed batch.
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<IndexedRecord>,
        batch_size: usize,
    ) -> Result<UpsertReport>;

    /// Return up to `top_k` matches ordered by similarity descending,
    /// ties broken by ascending vector id. `top_k == 0` fails with
    /// [`crate::Error::InvalidQuery`]. Read-only.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalMatch>>;
}

/// Sort matches by descending score with ascending-id tie break, then
/// truncate to `top_k`. Shared by backends so ordering is identical
/// everywhere.
pub(crate) fn rank_matches(mut matches: Vec<RetrievalMatch>, top_k: usize) -> Vec<RetrievalMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    matches.truncate(top_k);
    matches
}
