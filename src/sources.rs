//! Persistent registry of data sources.
//!
//! Sources are registered once with an id, a kind, and a locator; the
//! raw content is never stored here. Verification status shown by
//! [`SourceRegistry::list`] is derived from the audit log.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::models::{Locator, Source, SourceKind};

/// A source plus its registry-level verification status.
#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub source: Source,
    pub verified: bool,
    pub verification_count: i64,
}

pub struct SourceRegistry {
    pool: SqlitePool,
}

impl SourceRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a source. Returns `false` if the id was already taken
    /// (the existing registration is left untouched).
    pub async fn add(&self, source: &Source) -> Result<bool> {
        let (url, path) = match &source.locator {
            Locator::Url(u) => (Some(u.clone()), None),
            Locator::Path(p) => (None, Some(p.display().to_string())),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO sources (id, kind, url, path, registered_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&source.id)
        .bind(source.kind.to_string())
        .bind(url)
        .bind(path)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, id: &str) -> Result<Source> {
        let row = sqlx::query("SELECT id, kind, url, path FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::SourceNotFound(id.to_string()))?;

        row_to_source(&row)
    }

    /// List all sources in registration order with verification status.
    pub async fn list(&self) -> Result<Vec<SourceStatus>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.kind, s.url, s.path,
                   COUNT(v.seq) AS verification_count
            FROM sources s
            LEFT JOIN verification_log v ON v.source_id = s.id
            GROUP BY s.id
            ORDER BY s.registered_at, s.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut statuses = Vec::with_capacity(rows.len());
        for row in rows {
            let verification_count: i64 = row.get("verification_count");
            statuses.push(SourceStatus {
                source: row_to_source(&row)?,
                verified: verification_count > 0,
                verification_count,
            });
        }
        Ok(statuses)
    }
}

fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> Result<Source> {
    let id: String = row.get("id");
    let kind: String = row.get("kind");
    let url: Option<String> = row.get("url");
    let path: Option<String> = row.get("path");

    let kind = kind
        .parse::<SourceKind>()
        .map_err(Error::Config)?;
    let locator = match (url, path) {
        (Some(u), _) => Locator::Url(u),
        (None, Some(p)) => Locator::Path(p.into()),
        (None, None) => {
            return Err(Error::Config(format!(
                "source '{}' has neither url nor path",
                id
            )))
        }
    };

    Ok(Source { id, kind, locator })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::VerificationLog;
    use crate::db;
    use crate::migrate;
    use crate::models::VerificationRecord;

    async fn registry() -> (tempfile::TempDir, SqlitePool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::connect(&tmp.path().join("gw.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, pool)
    }

    fn website(id: &str) -> Source {
        Source {
            id: id.to_string(),
            kind: SourceKind::Website,
            locator: Locator::Url(format!("https://example.org/{}", id)),
        }
    }

    #[tokio::test]
    async fn test_add_get_roundtrip() {
        let (_tmp, pool) = registry().await;
        let reg = SourceRegistry::new(pool);
        assert!(reg.add(&website("org_website")).await.unwrap());

        let source = reg.get("org_website").await.unwrap();
        assert_eq!(source.kind, SourceKind::Website);
        assert_eq!(
            source.locator,
            Locator::Url("https://example.org/org_website".into())
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected_quietly() {
        let (_tmp, pool) = registry().await;
        let reg = SourceRegistry::new(pool);
        assert!(reg.add(&website("w")).await.unwrap());
        assert!(!reg.add(&website("w")).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_unknown_is_source_not_found() {
        let (_tmp, pool) = registry().await;
        let reg = SourceRegistry::new(pool);
        let err = reg.get("ghost").await.unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_reflects_verification_status() {
        let (_tmp, pool) = registry().await;
        let reg = SourceRegistry::new(pool.clone());
        let log = VerificationLog::new(pool);
        reg.add(&website("a")).await.unwrap();
        reg.add(&website("b")).await.unwrap();

        let record = VerificationRecord {
            source_id: "a".into(),
            content_hash: "deadbeef".into(),
            captured_at: Utc::now(),
            size_bytes: 10,
            content_type: None,
            last_modified: None,
            verified: true,
        };
        log.append(&record).await.unwrap();

        let statuses = reg.list().await.unwrap();
        assert_eq!(statuses.len(), 2);
        let a = statuses.iter().find(|s| s.source.id == "a").unwrap();
        let b = statuses.iter().find(|s| s.source.id == "b").unwrap();
        assert!(a.verified);
        assert_eq!(a.verification_count, 1);
        assert!(!b.verified);
    }
}
