//! # Tiered Memory CLI (`tmem`)
//!
//! ## Usage
//!
//! ```bash
//! tmem --config ./config/tmem.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tmem init` | Create the SQLite database and run schema migrations |
//! | `tmem ingest <files…>` | Ingest local files into a tier |
//! | `tmem query "<text>"` | Tier-weighted semantic search |
//! | `tmem get <id>` | Show a document and its chunks |
//! | `tmem delete <id>` | Remove a document |
//! | `tmem sweep` | Delete expired documents |
//! | `tmem sync` | Reconcile the configured folder mirror |
//! | `tmem stats` | Per-tier counts |
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level);
//! command output goes to stdout.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tiered_memory::engine::Ttl;
use tiered_memory::ingest::IngestArgs;
use tiered_memory::progress::ProgressMode;
use tiered_memory::search::QueryOutput;
use tiered_memory::{cleanup, config, get, ingest, migrate, search, stats, sync};
use tiered_memory_core::Tier;

/// Tiered long-term memory for a conversational assistant.
#[derive(Parser)]
#[command(
    name = "tmem",
    about = "Tiered long-term memory: ingest documents, query with tier-weighted ranking",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tmem.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest local files (txt, md, csv, pdf, docx) or inline text.
    Ingest {
        files: Vec<PathBuf>,

        /// Ingest this text instead of (or in addition to) files.
        #[arg(long)]
        text: Option<String>,

        /// Tier to store under: core, reference, or ephemeral.
        #[arg(long, default_value = "reference")]
        tier: Tier,

        /// Expire after this many seconds (default: the tier's TTL).
        #[arg(long, conflicts_with = "no_expiry", value_parser = clap::value_parser!(i64).range(0..))]
        ttl: Option<i64>,

        /// Never expire, even in the ephemeral tier.
        #[arg(long)]
        no_expiry: bool,
    },

    /// Tier-weighted semantic query.
    Query {
        text: String,

        /// Maximum passages (default: retrieval.top_k).
        #[arg(long, short)]
        k: Option<usize>,

        /// Minimum tier-adjusted score.
        #[arg(long)]
        min_score: Option<f64>,

        /// Restrict to these tiers (repeatable).
        #[arg(long)]
        tier: Vec<Tier>,

        /// Print the formatted context block.
        #[arg(long, conflicts_with = "json")]
        context: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show a document's metadata and chunks.
    Get {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// Delete a document. Unknown ids are a no-op.
    Delete { id: String },

    /// Delete every expired document.
    Sweep {
        #[arg(long)]
        json: bool,
    },

    /// Reconcile the `[sync] root` folder mirror against stored state.
    Sync {
        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr: off, human, or json (default: human on a TTY).
        #[arg(long)]
        progress: Option<String>,
    },

    /// Per-tier document and chunk counts.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tiered_memory=info,tiered_memory_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            files,
            text,
            tier,
            ttl,
            no_expiry,
        } => {
            let ttl = if no_expiry {
                Ttl::Never
            } else {
                Ttl::from_option(ttl)
            };
            ingest::run_ingest(
                &cfg,
                IngestArgs {
                    files,
                    text,
                    tier,
                    ttl,
                },
            )
            .await?;
        }
        Commands::Query {
            text,
            k,
            min_score,
            tier,
            context,
            json,
        } => {
            let output = if json {
                QueryOutput::Json
            } else if context {
                QueryOutput::Context
            } else {
                QueryOutput::Human
            };
            search::run_query(&cfg, &text, k, min_score, tier, output).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Delete { id } => {
            cleanup::run_delete(&cfg, &id).await?;
        }
        Commands::Sweep { json } => {
            cleanup::run_sweep(&cfg, json).await?;
        }
        Commands::Sync { dry_run, progress } => {
            let mode = match progress {
                Some(p) => ProgressMode::parse(&p)?,
                None => ProgressMode::default_for_tty(),
            };
            sync::run_sync(&cfg, dry_run, mode).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
    }

    Ok(())
}
