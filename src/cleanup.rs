//! Expired-document sweeps and the `sweep` / `delete` commands.
//!
//! Expiry is enforced at read time by retrieval; a sweep reclaims the
//! storage. Each tier is swept under its writer lock, vectors first and
//! then the metadata row, so a crash mid-sweep leaves at worst a metadata
//! row whose next sweep finishes the job.

use serde::Serialize;

use tiered_memory_core::{MemoryError, Result, Tier};

use crate::config::Config;
use crate::engine::{self, now_ts, MemoryEngine};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Documents removed, per tier.
    pub removed: Vec<(Tier, usize)>,
    pub chunks_removed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.removed.iter().map(|(_, n)| n).sum()
    }
}

impl MemoryEngine {
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        self.sweep_expired_at(now_ts()).await
    }

    /// Delete every document expired at `now`.
    pub async fn sweep_expired_at(&self, now: i64) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for tier in Tier::ALL {
            let _guard = self.lock_tier(tier).await;
            let expired = self
                .metadata
                .list_expired(tier, now)
                .await
                .map_err(MemoryError::Storage)?;

            let mut removed = 0;
            for id in &expired {
                report.chunks_removed += self
                    .index(tier)
                    .delete_by_document(id)
                    .await
                    .map_err(MemoryError::Storage)?;
                if self
                    .metadata
                    .delete_document(id)
                    .await
                    .map_err(MemoryError::Storage)?
                {
                    removed += 1;
                }
            }
            if removed > 0 {
                tracing::info!(tier = %tier, removed, "swept expired documents");
            }
            report.removed.push((tier, removed));
        }
        Ok(report)
    }
}

pub async fn run_sweep(config: &Config, json: bool) -> anyhow::Result<()> {
    let backend = engine::open(config).await?;
    let report = backend.engine.sweep_expired().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (tier, n) in &report.removed {
            println!("{:<10} {} expired document(s) removed", tier.as_str(), n);
        }
        println!(
            "total      {} document(s), {} chunk(s)",
            report.total(),
            report.chunks_removed
        );
    }
    backend.pool.close().await;
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> anyhow::Result<()> {
    let backend = engine::open(config).await?;
    if backend.engine.delete_document(id).await? {
        println!("deleted {}", id);
    } else {
        println!("no document with id {}", id);
    }
    backend.pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineSettings, IngestOptions, Ttl};
    use crate::test_support::{memory_engine, FakeEmbedder};
    use tiered_memory_core::store::{MetadataStore, VectorIndex};

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let fx = memory_engine(FakeEmbedder::new(8), EngineSettings::default());
        let short = IngestOptions {
            ttl: Ttl::Seconds(10),
            source_key: Some("short".into()),
            ..IngestOptions::default()
        };
        let long = IngestOptions {
            ttl: Ttl::Seconds(1_000),
            source_key: Some("long".into()),
            ..IngestOptions::default()
        };
        let gone = fx
            .engine
            .ingest_at("short lived note", Tier::Ephemeral, &short, 0)
            .await
            .unwrap();
        let kept = fx
            .engine
            .ingest_at("long lived note", Tier::Ephemeral, &long, 0)
            .await
            .unwrap();
        fx.engine
            .ingest_at("core fact", Tier::Core, &IngestOptions::default(), 0)
            .await
            .unwrap();

        let report = fx.engine.sweep_expired_at(500).await.unwrap();
        assert_eq!(report.total(), 1);
        assert_eq!(report.chunks_removed, 1);

        assert!(fx.metadata.get_document(&gone.document_id).await.unwrap().is_none());
        assert!(fx.metadata.get_document(&kept.document_id).await.unwrap().is_some());
        assert_eq!(fx.ephemeral.count().await.unwrap(), 1);
        assert_eq!(fx.core.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_expired_is_noop() {
        let fx = memory_engine(FakeEmbedder::new(8), EngineSettings::default());
        fx.engine.ingest("note", Tier::Ephemeral, None).await.unwrap();
        let report = fx.engine.sweep_expired().await.unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(report.removed.len(), 3);
    }
}
