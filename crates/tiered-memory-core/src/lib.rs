//! # Tiered Memory Core
//!
//! Shared, WASM-safe logic for the tiered memory engine: data models,
//! overlap chunking, the embedder trait, store abstractions, tier-weighted
//! retrieval, and remote-sync planning.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Orchestration (locking, persistence, CLI)
//! lives in the `tiered-memory` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod retrieve;
pub mod store;
pub mod sync;

pub use error::{MemoryError, Result};
pub use models::{Chunk, Document, Passage, Tier};
