//! Reconciling a remote source against the local memory.
//!
//! [`SyncReconciler::run`] lists the remote, diffs the listing against the
//! persisted sync state with [`plan_sync`], then processes files one at a
//! time:
//!
//! - **new / changed**: fetch, ingest under the mapped tier, commit the
//!   file's sync-state entry immediately.
//! - **removed**: delete the local document, drop the entry.
//!
//! Committing per file means an interrupted pass leaves state consistent
//! with exactly the files processed so far; the next pass resumes.
//!
//! Fetch and embedding failures are per-file: logged, counted under
//! `failed`, and the pass continues. Storage failures abort the pass.

use std::collections::HashMap;
use std::sync::Arc;

use tiered_memory_core::store::{SyncStateEntry, SyncStateStore};
use tiered_memory_core::sync::{plan_sync, PlannedFile, RemoteSource, SyncReport};
use tiered_memory_core::{MemoryError, Tier};

use crate::config::Config;
use crate::engine::{self, now_ts, IngestOptions, MemoryEngine, Ttl};
use crate::progress::{NoProgress, ProgressEvent, ProgressMode, ProgressReporter};
use crate::source_folder::FolderSource;

pub struct SyncReconciler {
    engine: Arc<MemoryEngine>,
    state: Arc<dyn SyncStateStore>,
    progress: Box<dyn ProgressReporter>,
}

impl SyncReconciler {
    pub fn new(engine: Arc<MemoryEngine>, state: Arc<dyn SyncStateStore>) -> Self {
        Self {
            engine,
            state,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Run one reconciliation pass. With `dry_run`, report what would
    /// happen without fetching, ingesting, or touching state.
    pub async fn run(
        &self,
        source: &dyn RemoteSource,
        folders: &HashMap<String, Tier>,
        dry_run: bool,
    ) -> anyhow::Result<SyncReport> {
        let name = source.name().to_string();
        self.progress.report(ProgressEvent::Listing {
            source: name.clone(),
        });

        let listing = source.list().await?;
        let state = self.state.entries(&name).await?;
        let plan = plan_sync(listing, &state, folders);

        for file in &plan.skipped {
            tracing::info!(
                source = %name,
                remote_id = %file.remote_id,
                folder = %file.parent_folder,
                "skipped file in unmapped folder"
            );
        }

        if dry_run {
            let report = plan.dry_run_report();
            tracing::info!(source = %name, ?report, "dry run complete");
            return Ok(report);
        }

        let mut report = SyncReport {
            unchanged: plan.unchanged.len(),
            skipped: plan.skipped.len(),
            ..SyncReport::default()
        };
        let total = (plan.new.len() + plan.changed.len() + plan.removed.len()) as u64;
        let mut done = 0u64;

        for (planned, is_new) in plan
            .new
            .iter()
            .map(|p| (p, true))
            .chain(plan.changed.iter().map(|p| (p, false)))
        {
            match self.sync_file(source, planned).await {
                Ok(()) if is_new => report.added += 1,
                Ok(()) => report.updated += 1,
                Err(err @ (MemoryError::SyncFetch { .. } | MemoryError::SyncEmbed { .. })) => {
                    tracing::warn!(source = %name, error = %err, "sync of file failed");
                    report.failed += 1;
                }
                Err(err) => return Err(err.into()),
            }
            done += 1;
            self.progress.report(ProgressEvent::Processing {
                source: name.clone(),
                n: done,
                total,
            });
        }

        for entry in &plan.removed {
            self.engine.delete_document(&entry.local_document_id).await?;
            self.state.remove(&name, &entry.remote_id).await?;
            tracing::info!(source = %name, remote_id = %entry.remote_id, "removed file");
            report.removed += 1;
            done += 1;
            self.progress.report(ProgressEvent::Processing {
                source: name.clone(),
                n: done,
                total,
            });
        }

        tracing::info!(
            source = %name,
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            failed = report.failed,
            "sync complete"
        );
        Ok(report)
    }

    /// Fetch, ingest, and commit one file.
    async fn sync_file(
        &self,
        source: &dyn RemoteSource,
        planned: &PlannedFile,
    ) -> Result<(), MemoryError> {
        let file = &planned.file;
        let name = source.name();

        let content = source
            .fetch(&file.remote_id)
            .await
            .map_err(|reason| MemoryError::SyncFetch {
                remote_id: file.remote_id.clone(),
                reason,
            })?;

        let opts = IngestOptions {
            source: Some(format!("{}:{}/{}", name, file.parent_folder, file.name)),
            source_key: Some(format!("{}:{}", name, file.remote_id)),
            ttl: Ttl::TierDefault,
        };
        let result = match self.engine.ingest_with(&content, planned.tier, &opts).await {
            Ok(result) => result,
            Err(err) if err.is_embedding_failure() || matches!(err, MemoryError::EmptyDocument(_)) => {
                return Err(MemoryError::SyncEmbed {
                    remote_id: file.remote_id.clone(),
                    reason: anyhow::Error::new(err),
                });
            }
            Err(err) => return Err(err),
        };

        if let Some(prev) = &planned.previous {
            if prev.local_document_id != result.document_id {
                self.engine.delete_document(&prev.local_document_id).await?;
            }
        }

        self.state
            .upsert(&SyncStateEntry {
                source: name.to_string(),
                remote_id: file.remote_id.clone(),
                local_document_id: result.document_id,
                fingerprint: file.fingerprint.clone(),
                modified_time: file.modified_time.clone(),
                tier: planned.tier,
                last_synced_at: now_ts(),
            })
            .await
            .map_err(MemoryError::Storage)?;
        Ok(())
    }
}

/// `tmem sync`: reconcile the configured folder mirror.
pub async fn run_sync(config: &Config, dry_run: bool, progress: ProgressMode) -> anyhow::Result<()> {
    let root = match &config.sync.root {
        Some(root) => root.clone(),
        None => anyhow::bail!("sync.root is not set in the config file"),
    };
    let folders = config.sync.folder_tiers()?;
    let source = FolderSource::new(
        &config.sync.source_name,
        root,
        &config.sync.include_globs,
        &config.sync.exclude_globs,
    )?;

    let backend = engine::open(config).await?;
    let reconciler = SyncReconciler::new(backend.engine.clone(), backend.sync_state.clone())
        .with_progress(progress.reporter());
    let report = reconciler.run(&source, &folders, dry_run).await?;

    let prefix = if dry_run { "sync (dry run)" } else { "sync" };
    println!("{} {}", prefix, config.sync.source_name);
    println!("  added:     {}", report.added);
    println!("  updated:   {}", report.updated);
    println!("  removed:   {}", report.removed);
    println!("  failed:    {}", report.failed);
    println!("  unchanged: {}", report.unchanged);
    println!("  skipped:   {}", report.skipped);

    backend.pool.close().await;
    Ok(())
}
