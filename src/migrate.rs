use anyhow::Result;
use sqlx::SqlitePool;

use tiered_memory_core::Tier;

use crate::config::Config;
use crate::db;

/// Name of the vector table backing `tier`.
pub fn vector_table(tier: Tier) -> &'static str {
    match tier {
        Tier::Core => "vectors_core",
        Tier::Reference => "vectors_reference",
        Tier::Ephemeral => "vectors_ephemeral",
    }
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Per-document metadata
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source TEXT,
            tier TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            ingested_at INTEGER NOT NULL,
            ttl_seconds INTEGER,
            last_accessed_at INTEGER,
            access_count INTEGER NOT NULL DEFAULT 0,
            chunk_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One vector collection per tier
    for tier in Tier::ALL {
        let table = vector_table(tier);
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                dims INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )
            "#
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_document_id ON {table}(document_id)"
        ))
        .execute(pool)
        .await?;
    }

    // Remote reconciliation state
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_state (
            source TEXT NOT NULL,
            remote_id TEXT NOT NULL,
            local_document_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            modified_time TEXT,
            tier TEXT NOT NULL,
            last_synced_at INTEGER NOT NULL,
            PRIMARY KEY (source, remote_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_tier ON documents(tier)")
        .execute(pool)
        .await?;

    Ok(())
}
