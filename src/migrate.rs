use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            raw_content BLOB NOT NULL,
            title TEXT NOT NULL,
            version TEXT NOT NULL,
            contact_name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            tags_json TEXT NOT NULL DEFAULT '[]',
            fields_json TEXT NOT NULL DEFAULT '{}',
            owner_username TEXT NOT NULL,
            slug TEXT,
            source_url TEXT NOT NULL,
            last_refreshed_at INTEGER,
            status TEXT NOT NULL DEFAULT 'registered',
            archived INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Slugs are globally unique when present
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_slug
         ON documents(slug) WHERE slug IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_username)")
        .execute(pool)
        .await?;

    // FTS5 virtual table over the analyzed projection
    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                document_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    Ok(())
}
