//! In-memory store implementations for testing and WASM targets.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Vector
//! queries are brute-force cosine similarity over every stored vector.
//! Nothing here survives a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Document, Tier};

use super::{
    ChunkCandidate, MetadataStore, StoredChunk, SyncStateEntry, SyncStateStore, VectorIndex,
};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

struct StoredVector {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory [`VectorIndex`] for one tier.
pub struct InMemoryVectorIndex {
    tier: Tier,
    dims: usize,
    vectors: RwLock<HashMap<String, StoredVector>>,
    upserts: AtomicUsize,
}

impl InMemoryVectorIndex {
    pub fn new(tier: Tier, dims: usize) -> Self {
        Self {
            tier,
            dims,
            vectors: RwLock::new(HashMap::new()),
            upserts: AtomicUsize::new(0),
        }
    }

    /// Number of successful upserts since construction.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            bail!(
                "vector for chunk {} has {} dims, index expects {}",
                chunk.id,
                vector.len(),
                self.dims
            );
        }
        write(&self.vectors)?.insert(
            chunk.id.clone(),
            StoredVector {
                chunk: chunk.clone(),
                vector: vector.to_vec(),
            },
        );
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        min_score: f64,
    ) -> Result<Vec<ChunkCandidate>> {
        let vecs = read(&self.vectors)?;
        let mut candidates: Vec<ChunkCandidate> = vecs
            .values()
            .filter_map(|sv| {
                let sim = cosine_similarity(vector, &sv.vector) as f64;
                (sim >= min_score).then(|| ChunkCandidate {
                    chunk_id: sv.chunk.id.clone(),
                    document_id: sv.chunk.document_id.clone(),
                    chunk_index: sv.chunk.chunk_index,
                    raw_score: sim,
                    text: sv.chunk.text.clone(),
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
        let mut vecs = write(&self.vectors)?;
        let before = vecs.len();
        vecs.retain(|_, sv| sv.chunk.document_id != document_id);
        Ok(before - vecs.len())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<StoredChunk>> {
        let vecs = read(&self.vectors)?;
        let mut chunks: Vec<StoredChunk> = vecs
            .values()
            .filter(|sv| sv.chunk.document_id == document_id)
            .map(|sv| StoredChunk {
                chunk_id: sv.chunk.id.clone(),
                chunk_index: sv.chunk.chunk_index,
                start_offset: sv.chunk.start_offset,
                end_offset: sv.chunk.end_offset,
                text: sv.chunk.text.clone(),
            })
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn count(&self) -> Result<usize> {
        Ok(read(&self.vectors)?.len())
    }
}

/// In-memory [`MetadataStore`].
#[derive(Default)]
pub struct InMemoryMetadataStore {
    docs: RwLock<HashMap<String, Document>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn record_document(&self, doc: &Document) -> Result<()> {
        write(&self.docs)?.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(read(&self.docs)?.get(id).cloned())
    }

    async fn touch_access(&self, id: &str, now: i64) -> Result<()> {
        if let Some(doc) = write(&self.docs)?.get_mut(id) {
            doc.access_count += 1;
            doc.last_accessed_at = Some(now);
        }
        Ok(())
    }

    async fn list_expired(&self, tier: Tier, now: i64) -> Result<Vec<String>> {
        let docs = read(&self.docs)?;
        let mut ids: Vec<String> = docs
            .values()
            .filter(|d| d.tier == tier && d.is_expired(now))
            .map(|d| d.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        Ok(write(&self.docs)?.remove(id).is_some())
    }

    async fn list_documents(&self, tier: Option<Tier>) -> Result<Vec<Document>> {
        let docs = read(&self.docs)?;
        let mut out: Vec<Document> = docs
            .values()
            .filter(|d| tier.map_or(true, |t| d.tier == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

/// In-memory [`SyncStateStore`].
#[derive(Default)]
pub struct InMemorySyncState {
    entries: RwLock<HashMap<(String, String), SyncStateEntry>>,
}

impl InMemorySyncState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStateStore for InMemorySyncState {
    async fn entries(&self, source: &str) -> Result<HashMap<String, SyncStateEntry>> {
        Ok(read(&self.entries)?
            .iter()
            .filter(|((s, _), _)| s == source)
            .map(|((_, remote_id), e)| (remote_id.clone(), e.clone()))
            .collect())
    }

    async fn upsert(&self, entry: &SyncStateEntry) -> Result<()> {
        write(&self.entries)?.insert(
            (entry.source.clone(), entry.remote_id.clone()),
            entry.clone(),
        );
        Ok(())
    }

    async fn remove(&self, source: &str, remote_id: &str) -> Result<()> {
        write(&self.entries)?.remove(&(source.to_string(), remote_id.to_string()));
        Ok(())
    }
}
