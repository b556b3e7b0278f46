//! `tmem stats`: per-tier document and chunk counts.

use anyhow::Result;

use crate::config::Config;
use crate::engine;

pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let backend = engine::open(config).await?;
    let stats = backend.engine.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        backend.pool.close().await;
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Tiered Memory Stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Embedder:    {}", backend.engine.embedder().model_name());
    println!();
    println!(
        "  {:<12} {:>6} {:>8} {:>8} {:>7}",
        "TIER", "DOCS", "CHUNKS", "EXPIRED", "WEIGHT"
    );
    println!("  {}", "-".repeat(45));
    for (tier, s) in &stats.tiers {
        println!(
            "  {:<12} {:>6} {:>8} {:>8} {:>7.1}",
            tier.as_str(),
            s.documents,
            s.chunks,
            s.expired,
            tier.weight()
        );
    }
    println!("  {}", "-".repeat(45));
    println!(
        "  {:<12} {:>6} {:>8} {:>8}",
        "total", stats.total_documents, stats.total_chunks, stats.total_expired
    );
    println!();

    backend.pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
