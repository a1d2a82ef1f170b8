//! In-memory [`VectorIndex`] implementation for tests and ephemeral runs.
//!
//! Namespaces live in a `HashMap` behind `std::sync::RwLock`; similarity
//! search is brute-force over all stored vectors. Each upsert batch is
//! applied under a single write-lock hold, so batches are atomic.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{IndexedRecord, RetrievalMatch};

use super::{rank_matches, MetadataFilter, Metric, UpsertReport, VectorIndex};

struct Namespace {
    dimension: usize,
    metric: Metric,
    records: HashMap<String, IndexedRecord>,
}

/// In-memory namespaced vector store.
pub struct MemoryIndex {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_namespace(&self, name: &str, dimension: usize, metric: Metric) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        match namespaces.get(name) {
            Some(ns) if ns.dimension != dimension => Err(Error::DimensionMismatch {
                namespace: name.to_string(),
                expected: ns.dimension,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                namespaces.insert(
                    name.to_string(),
                    Namespace {
                        dimension,
                        metric,
                        records: HashMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<IndexedRecord>,
        batch_size: usize,
    ) -> Result<UpsertReport> {
        let batch_size = batch_size.max(1);
        let mut batches_applied = 0usize;
        let mut records_applied = 0usize;

        for (batch_index, batch) in records.chunks(batch_size).enumerate() {
            let mut namespaces = self.namespaces.write().unwrap();
            let ns = namespaces
                .get_mut(namespace)
                .ok_or_else(|| Error::UpsertFailed {
                    namespace: namespace.to_string(),
                    batch_index,
                    batches_applied,
                    reason: "namespace does not exist".into(),
                })?;

            // Validate the whole batch before touching the store so the
            // batch stays atomic.
            for record in batch {
                if record.embedding.len() != ns.dimension {
                    return Err(Error::UpsertFailed {
                        namespace: namespace.to_string(),
                        batch_index,
                        batches_applied,
                        reason: format!(
                            "record '{}' has dimension {}, namespace expects {}",
                            record.id,
                            record.embedding.len(),
                            ns.dimension
                        ),
                    });
                }
            }

            for record in batch {
                ns.records.insert(record.id.clone(), record.clone());
            }
            batches_applied += 1;
            records_applied += batch.len();
        }

        Ok(UpsertReport {
            batches_applied,
            records_applied,
        })
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalMatch>> {
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be > 0".into()));
        }

        let namespaces = self.namespaces.read().unwrap();
        let ns = namespaces.get(namespace).ok_or_else(|| {
            Error::InvalidQuery(format!("namespace '{}' does not exist", namespace))
        })?;

        let matches: Vec<RetrievalMatch> = ns
            .records
            .values()
            .filter(|r| filter.map(|f| f.matches(r)).unwrap_or(true))
            .map(|r| RetrievalMatch {
                score: ns.metric.score(vector, &r.embedding),
                record: r.clone(),
            })
            .collect();

        Ok(rank_matches(matches, top_k))
    }
}
