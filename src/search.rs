//! `tmem query`: tier-weighted semantic search from the command line.

use anyhow::Result;

use tiered_memory_core::retrieve::format_context;
use tiered_memory_core::Tier;

use crate::config::Config;
use crate::engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutput {
    /// Numbered results with scores.
    Human,
    /// The context block handed to the chat orchestrator.
    Context,
    Json,
}

pub async fn run_query(
    config: &Config,
    text: &str,
    k: Option<usize>,
    min_score: Option<f64>,
    tiers: Vec<Tier>,
    output: QueryOutput,
) -> Result<()> {
    let backend = engine::open(config).await?;
    let tiers = if tiers.is_empty() { None } else { Some(tiers) };
    let passages = backend.engine.query(text, k, min_score, tiers).await?;
    backend.pool.close().await;

    match output {
        QueryOutput::Json => println!("{}", serde_json::to_string_pretty(&passages)?),
        QueryOutput::Context => print!("{}", format_context(&passages)),
        QueryOutput::Human => {
            if passages.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, p) in passages.iter().enumerate() {
                println!(
                    "{}. [{:.2}] {} / {}",
                    i + 1,
                    p.score,
                    p.tier,
                    p.source.as_deref().unwrap_or("(no source)")
                );
                println!("    raw: {:.3}  chunk: {}", p.raw_score, p.chunk_index);
                println!("    excerpt: \"{}\"", excerpt(&p.text, 160));
                println!("    id: {}", p.document_id);
                println!();
            }
        }
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
