//! Durable [`VectorIndex`] backend over SQLite.
//!
//! Embeddings are stored as little-endian f32 BLOBs and scored
//! brute-force in process; metadata rides along as JSON. Each upsert
//! batch runs in its own transaction, so a failed batch rolls back
//! whole and earlier batches stay applied.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{IndexedRecord, RetrievalMatch};

use super::{rank_matches, MetadataFilter, Metric, UpsertReport, VectorIndex};

/// SQLite-backed namespaced vector store.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn namespace_info(&self, name: &str) -> Result<Option<(usize, Metric)>> {
        let row = sqlx::query("SELECT dimension, metric FROM namespaces WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let dimension: i64 = row.get("dimension");
                let metric: String = row.get("metric");
                let metric = metric
                    .parse::<Metric>()
                    .map_err(Error::Config)?;
                Ok(Some((dimension as usize, metric)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn ensure_namespace(&self, name: &str, dimension: usize, metric: Metric) -> Result<()> {
        match self.namespace_info(name).await? {
            Some((existing, _)) if existing != dimension => Err(Error::DimensionMismatch {
                namespace: name.to_string(),
                expected: existing,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                sqlx::query("INSERT INTO namespaces (name, dimension, metric) VALUES (?, ?, ?)")
                    .bind(name)
                    .bind(dimension as i64)
                    .bind(metric.to_string())
                    .execute(&self.pool)
                    .await?;
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
        let (dimension, _) =
            self.namespace_info(namespace)
                .await?
                .ok_or_else(|| Error::UpsertFailed {
                    namespace: namespace.to_string(),
                    batch_index: 0,
                    batches_applied: 0,
                    reason: "namespace does not exist".into(),
                })?;

        let mut batches_applied = 0usize;
        let mut records_applied = 0usize;

        for (batch_index, batch) in records.chunks(batch_size).enumerate() {
            let failed = |reason: String| Error::UpsertFailed {
                namespace: namespace.to_string(),
                batch_index,
                batches_applied,
                reason,
            };

            for record in batch {
                if record.embedding.len() != dimension {
                    return Err(failed(format!(
                        "record '{}' has dimension {}, namespace expects {}",
                        record.id,
                        record.embedding.len(),
                        dimension
                    )));
                }
            }

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| failed(e.to_string()))?;

            for record in batch {
                let metadata_json = serde_json::to_string(&record.metadata)
                    .map_err(|e| failed(e.to_string()))?;
                sqlx::query(
                    r#"
                    INSERT INTO vectors (namespace, id, embedding, metadata_json)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(namespace, id) DO UPDATE SET
                        embedding = excluded.embedding,
                        metadata_json = excluded.metadata_json
                    "#,
                )
                .bind(namespace)
                .bind(&record.id)
                .bind(vec_to_blob(&record.embedding))
                .bind(&metadata_json)
                .execute(&mut *tx)
                .await
                .map_err(|e| failed(e.to_string()))?;
            }

            tx.commit().await.map_err(|e| failed(e.to_string()))?;
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

        let (_, metric) = self.namespace_info(namespace).await?.ok_or_else(|| {
            Error::InvalidQuery(format!("namespace '{}' does not exist", namespace))
        })?;

        let rows = sqlx::query("SELECT id, embedding, metadata_json FROM vectors WHERE namespace = ?")
            .bind(namespace)
            .fetch_all(&self.pool)
            .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata = serde_json::from_str(&metadata_json)?;

            let record = IndexedRecord {
                id,
                embedding: blob_to_vec(&blob),
                metadata,
            };
            if filter.map(|f| f.matches(&record)).unwrap_or(true) {
                matches.push(RetrievalMatch {
                    score: metric.score(vector, &record.embedding),
                    record,
                });
            }
        }

        Ok(rank_matches(matches, top_k))
    }
}
