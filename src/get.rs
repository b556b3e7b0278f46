//! `tmem get <id>`: print a document's metadata and chunks.

use anyhow::Result;

use tiered_memory_core::MemoryError;

use crate::config::Config;
use crate::engine;

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let backend = engine::open(config).await?;
    let view = backend.engine.get_document(id).await?;
    backend.pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let view = view.ok_or_else(|| MemoryError::DocumentNotFound(id.to_string()))?;
    let doc = &view.document;

    println!("--- Document ---");
    println!("id:            {}", doc.id);
    println!("source:        {}", doc.source.as_deref().unwrap_or("-"));
    println!("tier:          {}", doc.tier);
    println!("content_hash:  {}", doc.content_hash);
    println!("ingested_at:   {}", format_ts_iso(doc.ingested_at));
    match doc.expires_at() {
        Some(at) if view.expired => println!("expires_at:    {} (expired)", format_ts_iso(at)),
        Some(at) => println!("expires_at:    {}", format_ts_iso(at)),
        None => println!("expires_at:    never"),
    }
    println!("access_count:  {}", doc.access_count);
    if let Some(at) = doc.last_accessed_at {
        println!("last_accessed: {}", format_ts_iso(at));
    }
    println!();

    println!("--- Chunks ({}) ---", view.chunks.len());
    for chunk in &view.chunks {
        println!(
            "[chunk {}  chars {}..{}]",
            chunk.chunk_index, chunk.start_offset, chunk.end_offset
        );
        println!("{}", chunk.text);
        println!();
    }
    Ok(())
}
