//! Storage abstractions for the tiered memory engine.
//!
//! Three traits cover everything the engine persists:
//!
//! | Trait | Holds |
//! |-------|-------|
//! | [`VectorIndex`] | chunk text + embedding, one instance per tier |
//! | [`MetadataStore`] | one [`Document`] row per ingested document |
//! | [`SyncStateStore`] | one [`SyncStateEntry`] per tracked remote file |
//!
//! Backends return [`anyhow::Result`]; the engine wraps failures into
//! [`MemoryError::Storage`](crate::error::MemoryError::Storage).
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Chunk, Document, Tier};

/// A chunk returned from a vector query, with its raw cosine score.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub raw_score: f64,
    pub text: String,
}

/// A stored chunk without its vector, as returned by
/// [`VectorIndex::chunks_for_document`].
#[derive(Debug, Clone, Serialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub chunk_index: i64,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

/// Persisted reconciliation state for one remote file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStateEntry {
    /// Name of the remote source (e.g. `"drive"`).
    pub source: String,
    pub remote_id: String,
    pub local_document_id: String,
    /// Content hash reported by the remote listing.
    pub fingerprint: String,
    pub modified_time: Option<String>,
    /// Tier the file was last ingested under.
    pub tier: Tier,
    pub last_synced_at: i64,
}

/// Similarity index for the chunks of a single tier.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn tier(&self) -> Tier;

    /// Dimension every stored vector must have.
    fn dims(&self) -> usize;

    /// Insert or replace the chunk keyed by `chunk.id` (last write wins).
    ///
    /// Rejects vectors whose length differs from [`VectorIndex::dims`].
    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()>;

    /// Up to `k` chunks with cosine similarity `>= min_score`, best first.
    async fn query(&self, vector: &[f32], k: usize, min_score: f64)
        -> Result<Vec<ChunkCandidate>>;

    /// Remove every chunk of `document_id`. Returns how many were removed;
    /// zero is not an error.
    async fn delete_by_document(&self, document_id: &str) -> Result<usize>;

    /// Chunks of `document_id` ordered by index.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<StoredChunk>>;

    /// Total number of chunks in this tier.
    async fn count(&self) -> Result<usize>;
}

/// Durable per-document metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or wholesale replace the row for `doc.id`.
    async fn record_document(&self, doc: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// `false` for unknown ids.
    async fn is_expired(&self, id: &str, now: i64) -> Result<bool> {
        Ok(self
            .get_document(id)
            .await?
            .map(|d| d.is_expired(now))
            .unwrap_or(false))
    }

    /// Increment `access_count` and set `last_accessed_at = now`.
    /// Unknown ids are ignored.
    async fn touch_access(&self, id: &str, now: i64) -> Result<()>;

    /// Ids of documents in `tier` that are expired at `now`.
    async fn list_expired(&self, tier: Tier, now: i64) -> Result<Vec<String>>;

    /// Returns `true` if a row was removed.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// All documents, optionally restricted to one tier, ordered by id.
    async fn list_documents(&self, tier: Option<Tier>) -> Result<Vec<Document>>;
}

/// Persisted state of the remote reconciliation, keyed by
/// `(source, remote_id)`.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// All entries of `source`, keyed by remote id.
    async fn entries(&self, source: &str) -> Result<HashMap<String, SyncStateEntry>>;

    async fn upsert(&self, entry: &SyncStateEntry) -> Result<()>;

    /// No-op if the entry does not exist.
    async fn remove(&self, source: &str, remote_id: &str) -> Result<()>;
}

/// One [`VectorIndex`] per tier.
#[derive(Clone)]
pub struct TierIndexes {
    core: Arc<dyn VectorIndex>,
    reference: Arc<dyn VectorIndex>,
    ephemeral: Arc<dyn VectorIndex>,
}

impl TierIndexes {
    /// Fails if an index reports a tier other than its slot, or if the
    /// indexes disagree on dimension.
    pub fn new(
        core: Arc<dyn VectorIndex>,
        reference: Arc<dyn VectorIndex>,
        ephemeral: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        for (tier, index) in [
            (Tier::Core, &core),
            (Tier::Reference, &reference),
            (Tier::Ephemeral, &ephemeral),
        ] {
            if index.tier() != tier {
                anyhow::bail!(
                    "vector index for tier {} reports tier {}",
                    tier,
                    index.tier()
                );
            }
        }
        if core.dims() != reference.dims() || core.dims() != ephemeral.dims() {
            anyhow::bail!(
                "vector index dimensions differ: core={}, reference={}, ephemeral={}",
                core.dims(),
                reference.dims(),
                ephemeral.dims()
            );
        }
        Ok(Self {
            core,
            reference,
            ephemeral,
        })
    }

    pub fn get(&self, tier: Tier) -> &Arc<dyn VectorIndex> {
        match tier {
            Tier::Core => &self.core,
            Tier::Reference => &self.reference,
            Tier::Ephemeral => &self.ephemeral,
        }
    }

    /// Shared dimension of all three indexes.
    pub fn dims(&self) -> usize {
        self.core.dims()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tier, &Arc<dyn VectorIndex>)> {
        Tier::ALL.into_iter().map(move |t| (t, self.get(t)))
    }
}
