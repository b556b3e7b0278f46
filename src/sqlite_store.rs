//! SQLite-backed store implementations.
//!
//! Maps each core store trait onto the schema created by
//! [`migrate`](crate::migrate):
//!
//! | Type | Table |
//! |------|-------|
//! | [`SqliteVectorIndex`] | `vectors_core` / `vectors_reference` / `vectors_ephemeral` |
//! | [`SqliteMetadataStore`] | `documents` |
//! | [`SqliteSyncState`] | `sync_state` |
//!
//! Vectors are stored as little-endian f32 BLOBs; similarity queries are
//! brute-force cosine over every row of the tier's table.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use tiered_memory_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use tiered_memory_core::store::{
    ChunkCandidate, MetadataStore, StoredChunk, SyncStateEntry, SyncStateStore, TierIndexes,
    VectorIndex,
};
use tiered_memory_core::{Chunk, Document, Tier};

use crate::migrate::vector_table;

/// Build the three per-tier indexes over one pool.
pub fn tier_indexes(pool: &SqlitePool, dims: usize) -> Result<TierIndexes> {
    TierIndexes::new(
        std::sync::Arc::new(SqliteVectorIndex::new(pool.clone(), Tier::Core, dims)),
        std::sync::Arc::new(SqliteVectorIndex::new(pool.clone(), Tier::Reference, dims)),
        std::sync::Arc::new(SqliteVectorIndex::new(pool.clone(), Tier::Ephemeral, dims)),
    )
}

/// SQLite [`VectorIndex`] for one tier.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    tier: Tier,
    dims: usize,
    table: &'static str,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, tier: Tier, dims: usize) -> Self {
        Self {
            pool,
            tier,
            dims,
            table: vector_table(tier),
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            bail!(
                "vector for chunk {} has {} dims, {} expects {}",
                chunk.id,
                vector.len(),
                self.table,
                self.dims
            );
        }
        let blob = vec_to_blob(vector);

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (chunk_id, document_id, chunk_index, start_offset, end_offset,
                            text, hash, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                chunk_index = excluded.chunk_index,
                start_offset = excluded.start_offset,
                end_offset = excluded.end_offset,
                text = excluded.text,
                hash = excluded.hash,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
            self.table
        ))
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(chunk.start_offset as i64)
        .bind(chunk.end_offset as i64)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .bind(self.dims as i64)
        .bind(&blob)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        min_score: f64,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(&format!(
            "SELECT chunk_id, document_id, chunk_index, text, embedding FROM {}",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(vector, &blob_to_vec(&blob)) as f64;
                (similarity >= min_score).then(|| ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    raw_score: similarity,
                    text: row.get("text"),
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        candidates.truncate(k);

        Ok(candidates)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE document_id = ?", self.table))
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(&format!(
            "SELECT chunk_id, chunk_index, start_offset, end_offset, text FROM {} \
             WHERE document_id = ? ORDER BY chunk_index ASC",
            self.table
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StoredChunk {
                chunk_id: row.get("chunk_id"),
                chunk_index: row.get("chunk_index"),
                start_offset: row.get::<i64, _>("start_offset") as usize,
                end_offset: row.get::<i64, _>("end_offset") as usize,
                text: row.get("text"),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

/// SQLite [`MetadataStore`] over the `documents` table.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const DOCUMENT_COLUMNS: &str = "id, source, tier, content_hash, ingested_at, ttl_seconds, \
                                last_accessed_at, access_count, chunk_count";

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let tier: String = row.get("tier");
    Ok(Document {
        id: row.get("id"),
        source: row.get("source"),
        tier: tier.parse()?,
        content_hash: row.get("content_hash"),
        ingested_at: row.get("ingested_at"),
        ttl_seconds: row.get("ttl_seconds"),
        last_accessed_at: row.get("last_accessed_at"),
        access_count: row.get("access_count"),
        chunk_count: row.get("chunk_count"),
    })
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn record_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, source, tier, content_hash, ingested_at, ttl_seconds,
                                   last_accessed_at, access_count, chunk_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                tier = excluded.tier,
                content_hash = excluded.content_hash,
                ingested_at = excluded.ingested_at,
                ttl_seconds = excluded.ttl_seconds,
                last_accessed_at = excluded.last_accessed_at,
                access_count = excluded.access_count,
                chunk_count = excluded.chunk_count
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.source)
        .bind(doc.tier.as_str())
        .bind(&doc.content_hash)
        .bind(doc.ingested_at)
        .bind(doc.ttl_seconds)
        .bind(doc.last_accessed_at)
        .bind(doc.access_count)
        .bind(doc.chunk_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn touch_access(&self, id: &str, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET access_count = access_count + 1, last_accessed_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_expired(&self, tier: Tier, now: i64) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM documents
            WHERE tier = ? AND ttl_seconds IS NOT NULL AND ? > ingested_at + ttl_seconds
            ORDER BY id ASC
            "#,
        )
        .bind(tier.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_documents(&self, tier: Option<Tier>) -> Result<Vec<Document>> {
        let rows = match tier {
            Some(tier) => {
                sqlx::query(&format!(
                    "SELECT {} FROM documents WHERE tier = ? ORDER BY id ASC",
                    DOCUMENT_COLUMNS
                ))
                .bind(tier.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM documents ORDER BY id ASC",
                    DOCUMENT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(document_from_row).collect()
    }
}

/// SQLite [`SyncStateStore`] over the `sync_state` table.
pub struct SqliteSyncState {
    pool: SqlitePool,
}

impl SqliteSyncState {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStateStore for SqliteSyncState {
    async fn entries(&self, source: &str) -> Result<HashMap<String, SyncStateEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT source, remote_id, local_document_id, fingerprint, modified_time, tier,
                   last_synced_at
            FROM sync_state WHERE source = ?
            "#,
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let tier: String = row.get("tier");
            let entry = SyncStateEntry {
                source: row.get("source"),
                remote_id: row.get("remote_id"),
                local_document_id: row.get("local_document_id"),
                fingerprint: row.get("fingerprint"),
                modified_time: row.get("modified_time"),
                tier: tier.parse()?,
                last_synced_at: row.get("last_synced_at"),
            };
            out.insert(entry.remote_id.clone(), entry);
        }
        Ok(out)
    }

    async fn upsert(&self, entry: &SyncStateEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (source, remote_id, local_document_id, fingerprint,
                                    modified_time, tier, last_synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, remote_id) DO UPDATE SET
                local_document_id = excluded.local_document_id,
                fingerprint = excluded.fingerprint,
                modified_time = excluded.modified_time,
                tier = excluded.tier,
                last_synced_at = excluded.last_synced_at
            "#,
        )
        .bind(&entry.source)
        .bind(&entry.remote_id)
        .bind(&entry.local_document_id)
        .bind(&entry.fingerprint)
        .bind(&entry.modified_time)
        .bind(entry.tier.as_str())
        .bind(entry.last_synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, source: &str, remote_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_state WHERE source = ? AND remote_id = ?")
            .bind(source)
            .bind(remote_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
