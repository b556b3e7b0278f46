//! Configuration parsing and validation.
//!
//! Tiered Memory is configured via a TOML file (default: `config/tmem.toml`).
//! Only `[db]` is required; every other section has defaults.
//!
//! ```toml
//! [db]
//! path = "./data/memory.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! top_k = 5
//! min_score = 0.0
//!
//! [tiers]
//! ephemeral_ttl_secs = 2592000
//!
//! [embedding]
//! provider = "ollama"        # "disabled", "ollama", "openai", or "local"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [sync]
//! root = "./drive-mirror"
//!
//! [sync.folders]
//! "JARVIS-Core" = "core"
//! "JARVIS-Reference" = "reference"
//! "JARVIS-Ephemeral" = "ephemeral"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use tiered_memory_core::chunk;
use tiered_memory_core::models::DEFAULT_EPHEMERAL_TTL_SECS;
use tiered_memory_core::Tier;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub tiers: TiersConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: f64,
    /// Raw candidates fetched per tier before weighting. Defaults to `top_k`.
    #[serde(default)]
    pub candidate_k: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            candidate_k: None,
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct TiersConfig {
    #[serde(default = "default_ephemeral_ttl")]
    pub ephemeral_ttl_secs: i64,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            ephemeral_ttl_secs: default_ephemeral_ttl(),
        }
    }
}

fn default_ephemeral_ttl() -> i64 {
    DEFAULT_EPHEMERAL_TTL_SECS
}

impl TiersConfig {
    /// TTL applied to `tier` when ingestion does not specify one.
    pub fn default_ttl(&self, tier: Tier) -> Option<i64> {
        match tier {
            Tier::Ephemeral => Some(self.ephemeral_ttl_secs),
            other => other.default_ttl_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Dimension used for the vector tables when no provider is configured.
pub const FALLBACK_DIMS: usize = 384;

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Dimension of every stored vector.
    pub fn effective_dims(&self) -> usize {
        self.dims.unwrap_or(FALLBACK_DIMS)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Local mirror of the remote drive; each top-level folder is a remote folder.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Name used to scope persisted sync state.
    #[serde(default = "default_source_name")]
    pub source_name: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Folder name → tier name.
    #[serde(default = "default_folders")]
    pub folders: BTreeMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: None,
            source_name: default_source_name(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            folders: default_folders(),
        }
    }
}

fn default_source_name() -> String {
    "drive".to_string()
}

fn default_include_globs() -> Vec<String> {
    ["txt", "md", "markdown", "csv", "pdf", "docx"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

fn default_folders() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("JARVIS-Core".to_string(), "core".to_string()),
        ("JARVIS-Reference".to_string(), "reference".to_string()),
        ("JARVIS-Ephemeral".to_string(), "ephemeral".to_string()),
    ])
}

impl SyncConfig {
    /// Parse the folder map into tiers.
    pub fn folder_tiers(&self) -> Result<HashMap<String, Tier>> {
        self.folders
            .iter()
            .map(|(folder, tier)| {
                let tier: Tier = tier
                    .parse()
                    .with_context(|| format!("sync.folders.\"{}\"", folder))?;
                Ok((folder.clone(), tier))
            })
            .collect()
    }
}

impl Config {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        chunk::stride(self.chunking.chunk_size, self.chunking.overlap)
            .context("invalid [chunking] section")?;

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if let Some(k) = self.retrieval.candidate_k {
            if k < 1 {
                bail!("retrieval.candidate_k must be >= 1");
            }
        }

        if self.tiers.ephemeral_ttl_secs < 0 {
            bail!("tiers.ephemeral_ttl_secs must be >= 0");
        }

        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "ollama" | "openai" => {
                if self.embedding.dims.is_none() {
                    bail!(
                        "embedding.dims must be set when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, ollama, openai, or local.",
                other
            ),
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        self.sync.folder_tiers()?;
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml_str(&content)
}
