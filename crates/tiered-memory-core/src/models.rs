//! Core data models for the tiered memory engine.
//!
//! These types describe the documents, chunks, and retrieved passages
//! that flow through ingestion and retrieval. Timestamps are Unix seconds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MemoryError;

/// Default time-to-live for ephemeral documents: 30 days.
pub const DEFAULT_EPHEMERAL_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Memory tier of a document.
///
/// The tier controls both retrieval weight and default expiry.
///
/// | Tier | Weight | Default TTL |
/// |------|--------|-------------|
/// | `core` | 1.5 | never |
/// | `reference` | 1.0 | never |
/// | `ephemeral` | 0.7 | 30 days |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Core,
    Reference,
    Ephemeral,
}

impl Tier {
    /// All tiers, in descending weight order.
    pub const ALL: [Tier; 3] = [Tier::Core, Tier::Reference, Tier::Ephemeral];

    /// Multiplier applied to raw similarity scores at retrieval time.
    pub fn weight(self) -> f64 {
        match self {
            Tier::Core => 1.5,
            Tier::Reference => 1.0,
            Tier::Ephemeral => 0.7,
        }
    }

    /// TTL applied when ingestion does not specify one.
    pub fn default_ttl_seconds(self) -> Option<i64> {
        match self {
            Tier::Core | Tier::Reference => None,
            Tier::Ephemeral => Some(DEFAULT_EPHEMERAL_TTL_SECS),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Core => "core",
            Tier::Reference => "reference",
            Tier::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" => Ok(Tier::Core),
            "reference" => Ok(Tier::Reference),
            "ephemeral" => Ok(Tier::Ephemeral),
            _ => Err(MemoryError::UnknownTier(s.to_string())),
        }
    }
}

/// Per-document metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable id derived from the source key (see [`document_id_for`]).
    pub id: String,
    /// Human-readable origin (file path, `"folder:remote_id"`, ...).
    pub source: Option<String>,
    pub tier: Tier,
    /// SHA-256 of the ingested text.
    pub content_hash: String,
    pub ingested_at: i64,
    /// `None` means the document never expires.
    pub ttl_seconds: Option<i64>,
    pub last_accessed_at: Option<i64>,
    pub access_count: i64,
    pub chunk_count: i64,
}

impl Document {
    /// `now > ingested_at + ttl_seconds`. Documents without a TTL never expire.
    pub fn is_expired(&self, now: i64) -> bool {
        match self.ttl_seconds {
            Some(ttl) => now > self.ingested_at.saturating_add(ttl),
            None => false,
        }
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.ttl_seconds
            .map(|ttl| self.ingested_at.saturating_add(ttl))
    }
}

/// A window of a document's text, with its position in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `"{document_id}:{chunk_index}"`.
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    /// Offset of the first char, in chars.
    pub start_offset: usize,
    /// Offset one past the last char, in chars.
    pub end_offset: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A ranked retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub text: String,
    pub tier: Tier,
    pub document_id: String,
    pub chunk_id: String,
    pub chunk_index: i64,
    pub source: Option<String>,
    /// `raw_score * tier.weight()`.
    pub score: f64,
    /// Cosine similarity as returned by the vector index.
    pub raw_score: f64,
}

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derive a stable document id from a source key (path or remote id).
///
/// The same key always maps to the same id, which is what makes
/// re-ingestion replace rather than duplicate.
pub fn document_id_for(source_key: &str) -> String {
    let mut id = content_hash(source_key);
    id.truncate(32);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(ingested_at: i64, ttl: Option<i64>) -> Document {
        Document {
            id: "d1".to_string(),
            source: None,
            tier: Tier::Ephemeral,
            content_hash: "h".to_string(),
            ingested_at,
            ttl_seconds: ttl,
            last_accessed_at: None,
            access_count: 0,
            chunk_count: 1,
        }
    }

    #[test]
    fn test_tier_weights_order() {
        assert!(Tier::Core.weight() > Tier::Reference.weight());
        assert!(Tier::Reference.weight() > Tier::Ephemeral.weight());
        assert_eq!(Tier::Core.weight(), 1.5);
        assert_eq!(Tier::Reference.weight(), 1.0);
        assert_eq!(Tier::Ephemeral.weight(), 0.7);
    }

    #[test]
    fn test_default_ttl_policy() {
        assert_eq!(Tier::Core.default_ttl_seconds(), None);
        assert_eq!(Tier::Reference.default_ttl_seconds(), None);
        assert_eq!(Tier::Ephemeral.default_ttl_seconds(), Some(2_592_000));
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("core".parse::<Tier>().unwrap(), Tier::Core);
        assert_eq!(" Reference ".parse::<Tier>().unwrap(), Tier::Reference);
        assert_eq!("EPHEMERAL".parse::<Tier>().unwrap(), Tier::Ephemeral);
        assert!(matches!(
            "archive".parse::<Tier>(),
            Err(MemoryError::UnknownTier(_))
        ));
    }

    #[test]
    fn test_tier_serde_lowercase() {
        let json = serde_json::to_string(&Tier::Ephemeral).unwrap();
        assert_eq!(json, "\"ephemeral\"");
        let back: Tier = serde_json::from_str("\"core\"").unwrap();
        assert_eq!(back, Tier::Core);
    }

    #[test]
    fn test_expiry_is_strictly_after_ttl() {
        let d = doc(1_000, Some(1));
        assert!(!d.is_expired(1_000));
        assert!(!d.is_expired(1_001));
        assert!(d.is_expired(1_002));
        assert_eq!(d.expires_at(), Some(1_001));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let d = doc(0, None);
        assert!(!d.is_expired(i64::MAX));
        assert_eq!(d.expires_at(), None);
    }

    #[test]
    fn test_document_id_stable() {
        let a = document_id_for("/notes/todo.md");
        let b = document_id_for("/notes/todo.md");
        let c = document_id_for("/notes/other.md");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }
}
