//! The memory engine: ingest, query, get, delete, and stats.
//!
//! [`MemoryEngine`] is an explicit service object built once from the
//! per-tier vector indexes, the metadata store, and an embedder, then
//! shared by reference (or `Arc`) with every caller.
//!
//! # Write ordering
//!
//! A metadata row must never point at vectors that do not exist. Ingestion
//! therefore writes in this order:
//!
//! 1. chunk and embed (no writes; dimension checked here)
//! 2. drop the previous metadata row, if any
//! 3. delete every previous chunk of the document
//! 4. upsert the new chunks
//! 5. record the metadata row
//!
//! A crash at any step leaves at worst orphan vectors, which retrieval
//! ignores.
//!
//! # Locking
//!
//! Each tier has an async mutex. Writers hold it (for the old and new tier,
//! in tier order) only while mutating stores; sweeps take it per tier.
//! Queries never lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, MutexGuard};

use tiered_memory_core::chunk::{self, chunk_text};
use tiered_memory_core::embedding::Embedder;
use tiered_memory_core::models::{content_hash, document_id_for};
use tiered_memory_core::retrieve::{retrieve, RetrievalParams};
use tiered_memory_core::store::{
    MetadataStore, StoredChunk, SyncStateStore, TierIndexes, VectorIndex,
};
use tiered_memory_core::{Document, MemoryError, Passage, Result, Tier};

use crate::config::{Config, TiersConfig};
use crate::db;
use crate::embedding::create_embedder;
use crate::sqlite_store::{tier_indexes, SqliteMetadataStore, SqliteSyncState};

/// Engine tuning, decoupled from the TOML config.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub chunk_size: usize,
    pub overlap: usize,
    pub ephemeral_ttl_secs: i64,
    pub top_k: usize,
    pub min_score: f64,
    pub candidate_k: Option<usize>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            ephemeral_ttl_secs: tiered_memory_core::models::DEFAULT_EPHEMERAL_TTL_SECS,
            top_k: 5,
            min_score: 0.0,
            candidate_k: None,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            ephemeral_ttl_secs: config.tiers.ephemeral_ttl_secs,
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
            candidate_k: config.retrieval.candidate_k,
        }
    }

    fn default_ttl(&self, tier: Tier) -> Option<i64> {
        TiersConfig {
            ephemeral_ttl_secs: self.ephemeral_ttl_secs,
        }
        .default_ttl(tier)
    }
}

/// Expiry requested at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// The tier's default (30 days for ephemeral, never otherwise).
    #[default]
    TierDefault,
    Never,
    Seconds(i64),
}

impl Ttl {
    /// `Some(secs)` → [`Ttl::Seconds`], `None` → [`Ttl::TierDefault`].
    pub fn from_option(ttl_seconds: Option<i64>) -> Self {
        ttl_seconds.map_or(Ttl::TierDefault, Ttl::Seconds)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Human-readable origin stored on the document.
    pub source: Option<String>,
    /// Key the document id is derived from. Defaults to the tier plus the
    /// content hash, so the same text can live in more than one tier.
    pub source_key: Option<String>,
    pub ttl: Ttl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOutcome {
    Created,
    Updated,
    /// Same content, tier, and TTL as the live stored version; nothing written.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub document_id: String,
    pub outcome: IngestOutcome,
    pub chunk_count: usize,
}

/// A document with its chunks, as returned by [`MemoryEngine::get_document`].
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: Document,
    pub expired: bool,
    pub chunks: Vec<StoredChunk>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TierStats {
    pub documents: usize,
    pub chunks: usize,
    /// Expired but not yet swept.
    pub expired: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    pub tiers: Vec<(Tier, TierStats)>,
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_expired: usize,
}

pub struct MemoryEngine {
    pub(crate) indexes: TierIndexes,
    pub(crate) metadata: Arc<dyn MetadataStore>,
    embedder: Arc<dyn Embedder>,
    settings: EngineSettings,
    tier_locks: [Mutex<()>; 3],
}

fn tier_slot(tier: Tier) -> usize {
    match tier {
        Tier::Core => 0,
        Tier::Reference => 1,
        Tier::Ephemeral => 2,
    }
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

impl MemoryEngine {
    /// Fails with [`MemoryError::InvalidChunkConfig`] or
    /// [`MemoryError::EmbeddingDimensionMismatch`] when the parts do not fit.
    pub fn new(
        indexes: TierIndexes,
        metadata: Arc<dyn MetadataStore>,
        embedder: Arc<dyn Embedder>,
        settings: EngineSettings,
    ) -> Result<Self> {
        chunk::stride(settings.chunk_size, settings.overlap)?;
        if embedder.dims() != indexes.dims() {
            return Err(MemoryError::EmbeddingDimensionMismatch {
                expected: indexes.dims(),
                actual: embedder.dims(),
            });
        }
        Ok(Self {
            indexes,
            metadata,
            embedder,
            settings,
            tier_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub(crate) fn index(&self, tier: Tier) -> &Arc<dyn VectorIndex> {
        self.indexes.get(tier)
    }

    pub(crate) async fn lock_tier(&self, tier: Tier) -> MutexGuard<'_, ()> {
        self.tier_locks[tier_slot(tier)].lock().await
    }

    /// Lock several tiers in a fixed order so writers never deadlock.
    async fn lock_tiers(&self, tiers: &[Tier]) -> Vec<MutexGuard<'_, ()>> {
        let mut sorted = tiers.to_vec();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for tier in sorted {
            guards.push(self.lock_tier(tier).await);
        }
        guards
    }

    // ============ Ingest ============

    /// Ingest ad hoc content. The document id is derived from the tier and
    /// the content; a negative `ttl_seconds` is rejected.
    pub async fn ingest(&self, content: &str, tier: Tier, ttl_seconds: Option<i64>) -> Result<String> {
        let opts = IngestOptions {
            ttl: Ttl::from_option(ttl_seconds),
            ..IngestOptions::default()
        };
        Ok(self.ingest_with(content, tier, &opts).await?.document_id)
    }

    /// Ingest content keyed by a stable source (file path, remote id).
    /// Re-ingesting the same key replaces the previous version.
    pub async fn ingest_source(
        &self,
        source_key: &str,
        content: &str,
        tier: Tier,
        ttl: Ttl,
    ) -> Result<IngestResult> {
        let opts = IngestOptions {
            source: Some(source_key.to_string()),
            source_key: Some(source_key.to_string()),
            ttl,
        };
        self.ingest_with(content, tier, &opts).await
    }

    pub async fn ingest_with(
        &self,
        content: &str,
        tier: Tier,
        opts: &IngestOptions,
    ) -> Result<IngestResult> {
        self.ingest_at(content, tier, opts, now_ts()).await
    }

    pub async fn ingest_at(
        &self,
        content: &str,
        tier: Tier,
        opts: &IngestOptions,
        now: i64,
    ) -> Result<IngestResult> {
        if let Ttl::Seconds(secs) = opts.ttl {
            if secs < 0 {
                return Err(MemoryError::InvalidTtl(secs));
            }
        }

        let hash = content_hash(content);
        let document_id = match opts.source_key.as_deref() {
            Some(key) => document_id_for(key),
            None => document_id_for(&format!("{}:{}", tier.as_str(), hash)),
        };

        let chunks = chunk_text(
            &document_id,
            content,
            self.settings.chunk_size,
            self.settings.overlap,
        )?;
        if chunks.is_empty() {
            return Err(MemoryError::EmptyDocument(document_id));
        }

        let ttl_seconds = match opts.ttl {
            Ttl::TierDefault => self.settings.default_ttl(tier),
            Ttl::Never => None,
            Ttl::Seconds(secs) => Some(secs),
        };

        let existing = self
            .metadata
            .get_document(&document_id)
            .await
            .map_err(MemoryError::Storage)?;

        if let Some(prev) = &existing {
            let same = prev.content_hash == hash
                && prev.tier == tier
                && prev.ttl_seconds == ttl_seconds
                && prev.source == opts.source;
            if same && !prev.is_expired(now) {
                tracing::debug!(document_id = %document_id, "content unchanged, skipping");
                return Ok(IngestResult {
                    document_id,
                    outcome: IngestOutcome::Unchanged,
                    chunk_count: prev.chunk_count as usize,
                });
            }
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(MemoryError::Embedding)?;
        if vectors.len() != chunks.len() {
            return Err(MemoryError::Embedding(anyhow::anyhow!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let expected = self.indexes.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(MemoryError::EmbeddingDimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        let mut touched = vec![tier];
        if let Some(prev) = &existing {
            touched.push(prev.tier);
        }
        let _guards = self.lock_tiers(&touched).await;

        if existing.is_some() {
            self.metadata
                .delete_document(&document_id)
                .await
                .map_err(MemoryError::Storage)?;
        }
        for t in &touched {
            self.index(*t)
                .delete_by_document(&document_id)
                .await
                .map_err(MemoryError::Storage)?;
        }

        let index = self.index(tier);
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            index
                .upsert(chunk, vector)
                .await
                .map_err(MemoryError::Storage)?;
        }

        let (last_accessed_at, access_count) = existing
            .as_ref()
            .map(|p| (p.last_accessed_at, p.access_count))
            .unwrap_or((None, 0));
        let doc = Document {
            id: document_id.clone(),
            source: opts.source.clone(),
            tier,
            content_hash: hash,
            ingested_at: now,
            ttl_seconds,
            last_accessed_at,
            access_count,
            chunk_count: chunks.len() as i64,
        };
        self.metadata
            .record_document(&doc)
            .await
            .map_err(MemoryError::Storage)?;

        let outcome = if existing.is_some() {
            IngestOutcome::Updated
        } else {
            IngestOutcome::Created
        };
        tracing::info!(
            document_id = %document_id,
            tier = %tier,
            chunks = chunks.len(),
            ?outcome,
            "ingested document"
        );

        Ok(IngestResult {
            document_id,
            outcome,
            chunk_count: chunks.len(),
        })
    }

    // ============ Query ============

    /// Tier-weighted semantic query. `k` and `min_score` fall back to the
    /// configured defaults.
    pub async fn query(
        &self,
        text: &str,
        k: Option<usize>,
        min_score: Option<f64>,
        tiers: Option<Vec<Tier>>,
    ) -> Result<Vec<Passage>> {
        let params = RetrievalParams {
            k: k.unwrap_or(self.settings.top_k),
            min_score: min_score.unwrap_or(self.settings.min_score),
            candidate_k: self.settings.candidate_k,
            tiers,
        };
        self.query_at(text, &params, now_ts()).await
    }

    pub async fn query_at(
        &self,
        text: &str,
        params: &RetrievalParams,
        now: i64,
    ) -> Result<Vec<Passage>> {
        if text.trim().is_empty() || params.k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(text)
            .await
            .map_err(MemoryError::Embedding)?;
        if query_vec.len() != self.indexes.dims() {
            return Err(MemoryError::EmbeddingDimensionMismatch {
                expected: self.indexes.dims(),
                actual: query_vec.len(),
            });
        }

        retrieve(&self.indexes, self.metadata.as_ref(), &query_vec, params, now)
            .await
            .map_err(MemoryError::Storage)
    }

    // ============ Get / Delete ============

    /// Metadata plus ordered chunks. Unknown ids return `None`.
    pub async fn get_document(&self, id: &str) -> Result<Option<DocumentView>> {
        let document = match self
            .metadata
            .get_document(id)
            .await
            .map_err(MemoryError::Storage)?
        {
            Some(doc) => doc,
            None => return Ok(None),
        };
        let chunks = self
            .index(document.tier)
            .chunks_for_document(id)
            .await
            .map_err(MemoryError::Storage)?;
        Ok(Some(DocumentView {
            expired: document.is_expired(now_ts()),
            document,
            chunks,
        }))
    }

    /// Remove a document's chunks and metadata row. Unknown ids are a
    /// no-op; returns whether a metadata row was removed.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let existing = self
            .metadata
            .get_document(id)
            .await
            .map_err(MemoryError::Storage)?;

        // Without a metadata row the tier is unknown; clear orphans everywhere.
        let tiers: Vec<Tier> = match &existing {
            Some(doc) => vec![doc.tier],
            None => Tier::ALL.to_vec(),
        };
        let _guards = self.lock_tiers(&tiers).await;

        for tier in &tiers {
            self.index(*tier)
                .delete_by_document(id)
                .await
                .map_err(MemoryError::Storage)?;
        }
        let removed = self
            .metadata
            .delete_document(id)
            .await
            .map_err(MemoryError::Storage)?;

        if removed {
            tracing::info!(document_id = %id, "deleted document");
        } else {
            tracing::debug!(document_id = %id, "delete of unknown document");
        }
        Ok(removed)
    }

    // ============ Stats ============

    pub async fn stats(&self) -> Result<MemoryStats> {
        self.stats_at(now_ts()).await
    }

    pub async fn stats_at(&self, now: i64) -> Result<MemoryStats> {
        let docs = self
            .metadata
            .list_documents(None)
            .await
            .map_err(MemoryError::Storage)?;

        let mut per_tier: HashMap<Tier, TierStats> = HashMap::new();
        for doc in &docs {
            let entry = per_tier.entry(doc.tier).or_default();
            entry.documents += 1;
            if doc.is_expired(now) {
                entry.expired += 1;
            }
        }

        let mut stats = MemoryStats::default();
        for (tier, index) in self.indexes.iter() {
            let mut tier_stats = per_tier.remove(&tier).unwrap_or_default();
            tier_stats.chunks = index.count().await.map_err(MemoryError::Storage)?;
            stats.total_documents += tier_stats.documents;
            stats.total_chunks += tier_stats.chunks;
            stats.total_expired += tier_stats.expired;
            stats.tiers.push((tier, tier_stats));
        }
        Ok(stats)
    }
}

/// SQLite-backed engine plus the sync-state store over the same pool.
pub struct SqliteBackend {
    pub pool: SqlitePool,
    pub engine: Arc<MemoryEngine>,
    pub sync_state: Arc<dyn SyncStateStore>,
}

/// Open the database named in `config` and wire up the engine.
///
/// The schema must already exist (`tmem init`).
pub async fn open(config: &Config) -> anyhow::Result<SqliteBackend> {
    let pool = db::connect(config).await?;
    let embedder = create_embedder(&config.embedding)?;
    let indexes = tier_indexes(&pool, embedder.dims())?;
    let metadata: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(pool.clone()));
    let engine = MemoryEngine::new(indexes, metadata, embedder, EngineSettings::from_config(config))?;
    Ok(SqliteBackend {
        sync_state: Arc::new(SqliteSyncState::new(pool.clone())),
        engine: Arc::new(engine),
        pool,
    })
}
