//! Deterministic embedder and in-memory engine fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use tiered_memory_core::embedding::Embedder;
use tiered_memory_core::store::memory::{InMemoryMetadataStore, InMemoryVectorIndex};
use tiered_memory_core::store::TierIndexes;
use tiered_memory_core::Tier;

use crate::engine::{EngineSettings, MemoryEngine};

/// Bag-of-bytes embedder: identical text always maps to the identical vector.
pub struct FakeEmbedder {
    dims: usize,
    output_dims: usize,
    fail_on: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl FakeEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            output_dims: dims,
            fail_on: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Declare `dims` but return vectors of another length.
    pub fn with_output_dims(mut self, output_dims: usize) -> Self {
        self.output_dims = output_dims;
        self
    }

    /// Fail any text containing `marker`.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                anyhow::bail!("fake embedder refused text containing {marker}");
            }
        }
        let mut v = vec![0.0f32; self.output_dims];
        for b in text.bytes() {
            v[b as usize % self.output_dims] += 1.0;
        }
        Ok(v)
    }
}

pub struct EngineFixture {
    pub engine: Arc<MemoryEngine>,
    pub core: Arc<InMemoryVectorIndex>,
    pub reference: Arc<InMemoryVectorIndex>,
    pub ephemeral: Arc<InMemoryVectorIndex>,
    pub metadata: Arc<InMemoryMetadataStore>,
}

pub fn memory_engine(embedder: FakeEmbedder, settings: EngineSettings) -> EngineFixture {
    let dims = embedder.dims();
    let core = Arc::new(InMemoryVectorIndex::new(Tier::Core, dims));
    let reference = Arc::new(InMemoryVectorIndex::new(Tier::Reference, dims));
    let ephemeral = Arc::new(InMemoryVectorIndex::new(Tier::Ephemeral, dims));
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let indexes = TierIndexes::new(core.clone(), reference.clone(), ephemeral.clone()).unwrap();
    let engine = MemoryEngine::new(indexes, metadata.clone(), Arc::new(embedder), settings).unwrap();
    EngineFixture {
        engine: Arc::new(engine),
        core,
        reference,
        ephemeral,
        metadata,
    }
}
