//! # Tiered Memory
//!
//! Long-term memory for a conversational assistant. Documents are chunked,
//! embedded, and stored in one of three tiers; queries rank passages by
//! cosine similarity weighted by tier, skipping expired documents.
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────────┐
//! │ files / sync │──▶│ chunk + embed │──▶│ SQLite           │
//! │ FolderSource │   │ MemoryEngine  │   │ documents        │
//! └──────────────┘   └───────┬───────┘   │ vectors_{tier}   │
//!                            │           │ sync_state       │
//!                            ▼           └──────────────────┘
//!                     tier-weighted query
//! ```
//!
//! The storage-agnostic pieces (chunker, ranking, sync planning, store
//! traits) live in `tiered-memory-core`; this crate adds the SQLite stores,
//! embedding providers, document loaders, and the `tmem` CLI.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`engine`] | Ingest, query, get, delete, stats |
//! | [`cleanup`] | Expired-document sweeps |
//! | [`sync`] | Remote reconciliation |
//! | [`source_folder`] | Folder-mirror remote source |
//! | [`sqlite_store`] | SQLite vector and metadata stores |
//! | [`embedding`] | Embedding providers |
//! | [`loader`] | txt / md / csv / pdf / docx loading |

pub mod cleanup;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod get;
pub mod ingest;
pub mod loader;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod source_folder;
pub mod sqlite_store;
pub mod stats;
pub mod sync;

#[cfg(test)]
mod test_support;
