//! Error type shared by every memory-engine operation.
//!
//! Store and embedder backends report failures as [`anyhow::Error`]; the
//! engine wraps them into [`MemoryError::Storage`] or
//! [`MemoryError::Embedding`] so callers can tell a broken backend apart
//! from a rejected request.

use thiserror::Error;

/// Errors produced by chunking, ingestion, retrieval, and sync.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// `overlap >= chunk_size`, so the stride would be zero or negative.
    #[error("invalid chunk config: overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    InvalidChunkConfig { chunk_size: usize, overlap: usize },

    #[error("embedding dimension mismatch: index expects {expected}, embedder produced {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The content produced no chunks.
    #[error("document {0} has no content to ingest")]
    EmptyDocument(String),

    #[error("unknown tier '{0}': must be core, reference, or ephemeral")]
    UnknownTier(String),

    /// A per-document TTL below zero.
    #[error("invalid ttl {0}s: must be >= 0")]
    InvalidTtl(i64),

    #[error("failed to fetch remote file {remote_id}: {reason:#}")]
    SyncFetch {
        remote_id: String,
        reason: anyhow::Error,
    },

    #[error("failed to embed remote file {remote_id}: {reason:#}")]
    SyncEmbed {
        remote_id: String,
        reason: anyhow::Error,
    },

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("storage backend error: {0:#}")]
    Storage(anyhow::Error),
}

impl MemoryError {
    /// True for failures of the embedding step (provider errors and
    /// dimension mismatches).
    pub fn is_embedding_failure(&self) -> bool {
        matches!(
            self,
            MemoryError::Embedding(_) | MemoryError::EmbeddingDimensionMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_chunk_config_message() {
        let err = MemoryError::InvalidChunkConfig {
            chunk_size: 100,
            overlap: 100,
        };
        assert_eq!(
            err.to_string(),
            "invalid chunk config: overlap (100) must be smaller than chunk_size (100)"
        );
    }

    #[test]
    fn test_invalid_ttl_message() {
        assert_eq!(
            MemoryError::InvalidTtl(-5).to_string(),
            "invalid ttl -5s: must be >= 0"
        );
        assert!(!MemoryError::InvalidTtl(-5).is_embedding_failure());
    }

    #[test]
    fn test_embedding_failure_classification() {
        assert!(MemoryError::EmbeddingDimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_embedding_failure());
        assert!(MemoryError::Embedding(anyhow::anyhow!("boom")).is_embedding_failure());
        assert!(!MemoryError::Storage(anyhow::anyhow!("disk")).is_embedding_failure());
    }

    #[test]
    fn test_storage_error_includes_cause_chain() {
        let cause = anyhow::anyhow!("database is locked").context("delete failed");
        let err = MemoryError::Storage(cause);
        let msg = err.to_string();
        assert!(msg.contains("delete failed"));
        assert!(msg.contains("database is locked"));
    }
}
