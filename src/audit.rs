//! Append-only verification audit log.
//!
//! Every successful verification is recorded as (source id, full
//! record, log timestamp) in insertion order. Re-verifications append;
//! nothing is ever updated or deleted, so the full trust history of a
//! source stays queryable.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::{VerificationLogEntry, VerificationRecord};

pub struct VerificationLog {
    pool: SqlitePool,
}

impl VerificationLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a record. Returns the stored entry.
    pub async fn append(&self, record: &VerificationRecord) -> Result<VerificationLogEntry> {
        let logged_at = Utc::now();
        let record_json = serde_json::to_string(record)?;

        sqlx::query(
            "INSERT INTO verification_log (source_id, record_json, logged_at) VALUES (?, ?, ?)",
        )
        .bind(&record.source_id)
        .bind(&record_json)
        .bind(logged_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(VerificationLogEntry {
            source_id: record.source_id.clone(),
            record: record.clone(),
            logged_at,
        })
    }

    /// All entries for one source, oldest first.
    pub async fn for_source(&self, source_id: &str) -> Result<Vec<VerificationLogEntry>> {
        let rows = sqlx::query(
            "SELECT source_id, record_json, logged_at FROM verification_log WHERE source_id = ? ORDER BY seq",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    /// The full log in insertion order.
    pub async fn list(&self) -> Result<Vec<VerificationLogEntry>> {
        let rows = sqlx::query(
            "SELECT source_id, record_json, logged_at FROM verification_log ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<VerificationLogEntry> {
    let source_id: String = row.get("source_id");
    let record_json: String = row.get("record_json");
    let logged_at: i64 = row.get("logged_at");

    Ok(VerificationLogEntry {
        source_id,
        record: serde_json::from_str(&record_json)?,
        logged_at: DateTime::from_timestamp(logged_at, 0).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;

    async fn log() -> (tempfile::TempDir, VerificationLog) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::connect(&tmp.path().join("gw.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, VerificationLog::new(pool))
    }

    fn record(source_id: &str, hash: &str) -> VerificationRecord {
        VerificationRecord {
            source_id: source_id.into(),
            content_hash: hash.into(),
            captured_at: Utc::now(),
            size_bytes: 42,
            content_type: Some("text/plain".into()),
            last_modified: None,
            verified: true,
        }
    }

    #[tokio::test]
    async fn test_append_preserves_insertion_order() {
        let (_tmp, log) = log().await;
        log.append(&record("a", "h1")).await.unwrap();
        log.append(&record("b", "h2")).await.unwrap();
        log.append(&record("a", "h3")).await.unwrap();

        let all = log.list().await.unwrap();
        let hashes: Vec<&str> = all.iter().map(|e| e.record.content_hash.as_str()).collect();
        assert_eq!(hashes, vec!["h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn test_reverification_retains_both_records() {
        let (_tmp, log) = log().await;
        log.append(&record("a", "before")).await.unwrap();
        log.append(&record("a", "after")).await.unwrap();

        let entries = log.for_source("a").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record.content_hash, "before");
        assert_eq!(entries[1].record.content_hash, "after");
        assert!(entries.iter().all(|e| e.source_id == "a"));
    }

    #[tokio::test]
    async fn test_for_source_filters() {
        let (_tmp, log) = log().await;
        log.append(&record("a", "h1")).await.unwrap();
        log.append(&record("b", "h2")).await.unwrap();

        let entries = log.for_source("b").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.content_hash, "h2");
        assert!(log.for_source("c").await.unwrap().is_empty());
    }
}
