use sqlx::SqlitePool;

use crate::error::Result;

/// Create the schema. Idempotent — safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Registered sources
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            url TEXT,
            path TEXT,
            registered_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only verification log. No UPDATE/DELETE path exists for
    // this table; insertion order is the audit order.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            record_json TEXT NOT NULL,
            logged_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vector index namespaces
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS namespaces (
            name TEXT PRIMARY KEY,
            dimension INTEGER NOT NULL,
            metric TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexed vectors with provenance metadata
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            namespace TEXT NOT NULL,
            id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL,
            PRIMARY KEY (namespace, id),
            FOREIGN KEY (namespace) REFERENCES namespaces(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_verification_log_source ON verification_log(source_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_namespace ON vectors(namespace)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::connect(&tmp.path().join("gw.sqlite")).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }
}
