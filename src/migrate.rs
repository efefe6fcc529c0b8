use anyhow::Result;
use sqlx::SqlitePool;

/// Create the catalog schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_documents (
            id TEXT PRIMARY KEY,
            business_id TEXT NOT NULL UNIQUE,
            tenant_id TEXT NOT NULL,
            display_name TEXT,
            category TEXT,
            attributes TEXT NOT NULL DEFAULT '[]',
            raw_text TEXT NOT NULL DEFAULT '',
            search_tokens TEXT NOT NULL DEFAULT '',
            normalized_tokens TEXT NOT NULL DEFAULT '[]',
            source_json TEXT NOT NULL DEFAULT '{}',
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            created_at INTEGER NOT NULL,
            created_by TEXT NOT NULL,
            last_modified_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_documents_tenant \
         ON catalog_documents(tenant_id, is_deleted)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_documents_category \
         ON catalog_documents(tenant_id, category)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_documents_created_at \
         ON catalog_documents(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
