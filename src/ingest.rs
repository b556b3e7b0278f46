//! `tmem ingest`: load local files (or inline text) into a tier.
//!
//! Files are keyed by their canonical path, so ingesting the same file
//! again replaces it (or reports it unchanged). A file that fails to load
//! or embed is reported and skipped; the command fails at the end if any
//! file did.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use tiered_memory_core::Tier;

use crate::config::Config;
use crate::engine::{self, IngestOptions, IngestResult, MemoryEngine, Ttl};
use crate::loader;

pub struct IngestArgs {
    pub files: Vec<PathBuf>,
    pub text: Option<String>,
    pub tier: Tier,
    pub ttl: Ttl,
}

pub async fn run_ingest(config: &Config, args: IngestArgs) -> Result<()> {
    if args.files.is_empty() && args.text.is_none() {
        bail!("nothing to ingest: pass one or more files or --text");
    }

    let backend = engine::open(config).await?;
    let mut failed = 0usize;

    if let Some(text) = &args.text {
        let opts = IngestOptions {
            ttl: args.ttl,
            ..IngestOptions::default()
        };
        match backend.engine.ingest_with(text, args.tier, &opts).await {
            Ok(result) => print_result(&result, "(inline text)"),
            Err(e) => {
                tracing::warn!(error = %e, "inline ingest failed");
                eprintln!("failed   (inline text): {}", e);
                failed += 1;
            }
        }
    }

    for path in &args.files {
        match ingest_file(&backend.engine, path, args.tier, args.ttl).await {
            Ok(result) => print_result(&result, &path.display().to_string()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "file ingest failed");
                eprintln!("failed   {}: {:#}", path.display(), e);
                failed += 1;
            }
        }
    }

    backend.pool.close().await;
    if failed > 0 {
        bail!("{} input(s) failed to ingest", failed);
    }
    Ok(())
}

async fn ingest_file(engine: &MemoryEngine, path: &Path, tier: Tier, ttl: Ttl) -> Result<IngestResult> {
    let content = loader::load_file(path)?;
    let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let key = key.to_string_lossy();
    Ok(engine.ingest_source(&key, &content, tier, ttl).await?)
}

fn print_result(result: &IngestResult, label: &str) {
    let outcome = match result.outcome {
        engine::IngestOutcome::Created => "created",
        engine::IngestOutcome::Updated => "updated",
        engine::IngestOutcome::Unchanged => "unchanged",
    };
    println!(
        "{:<9} {}  {} ({} chunk{})",
        outcome,
        result.document_id,
        label,
        result.chunk_count,
        if result.chunk_count == 1 { "" } else { "s" }
    );
}
