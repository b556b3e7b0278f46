//! Tier-weighted retrieval across the per-tier vector indexes.
//!
//! The caller embeds the query once; [`retrieve`] does the rest:
//!
//! 1. Query each selected tier for `candidate_k` raw candidates.
//! 2. `adjusted = raw_score × tier.weight()`.
//! 3. Drop candidates whose document is expired at `now` or has no
//!    metadata row, then those with `adjusted < min_score`.
//! 4. Merge and sort by adjusted score (desc), `last_accessed_at` (desc,
//!    never-accessed last), document id (asc), chunk index (asc).
//! 5. Truncate to `k` and record one access per returned document.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::models::{Document, Passage, Tier};
use crate::store::{MetadataStore, TierIndexes};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Maximum passages to return.
    pub k: usize,
    /// Minimum adjusted score.
    pub min_score: f64,
    /// Raw candidates fetched per tier. `None` means `k`.
    pub candidate_k: Option<usize>,
    /// Restrict to these tiers. `None` means all.
    pub tiers: Option<Vec<Tier>>,
}

impl RetrievalParams {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            min_score: 0.0,
            candidate_k: None,
            tiers: None,
        }
    }

    fn selected_tiers(&self) -> Vec<Tier> {
        match &self.tiers {
            Some(filter) => Tier::ALL
                .into_iter()
                .filter(|t| filter.contains(t))
                .collect(),
            None => Tier::ALL.to_vec(),
        }
    }
}

/// Run a tier-weighted query. See the module docs for the ranking rules.
pub async fn retrieve(
    indexes: &TierIndexes,
    metadata: &dyn MetadataStore,
    query_vec: &[f32],
    params: &RetrievalParams,
    now: i64,
) -> Result<Vec<Passage>> {
    if params.k == 0 {
        return Ok(Vec::new());
    }
    let candidate_k = params.candidate_k.unwrap_or(params.k).max(params.k);

    let mut docs: HashMap<String, Option<Document>> = HashMap::new();
    let mut scored: Vec<(Passage, Option<i64>)> = Vec::new();

    for tier in params.selected_tiers() {
        let weight = tier.weight();
        let raw_floor = params.min_score / weight;
        let candidates = indexes
            .get(tier)
            .query(query_vec, candidate_k, raw_floor)
            .await?;

        for cand in candidates {
            if !docs.contains_key(&cand.document_id) {
                let doc = metadata.get_document(&cand.document_id).await?;
                docs.insert(cand.document_id.clone(), doc);
            }
            let doc = match docs.get(&cand.document_id) {
                Some(Some(doc)) if !doc.is_expired(now) => doc,
                _ => continue,
            };

            let adjusted = cand.raw_score * weight;
            if adjusted < params.min_score {
                continue;
            }

            scored.push((
                Passage {
                    text: cand.text,
                    tier,
                    document_id: cand.document_id,
                    chunk_id: cand.chunk_id,
                    chunk_index: cand.chunk_index,
                    source: doc.source.clone(),
                    score: adjusted,
                    raw_score: cand.raw_score,
                },
                doc.last_accessed_at,
            ));
        }
    }

    scored.sort_by(|(a, a_seen), (b, b_seen)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b_seen.cmp(a_seen))
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    scored.truncate(params.k);

    let passages: Vec<Passage> = scored.into_iter().map(|(p, _)| p).collect();

    let mut touched = HashSet::new();
    for p in &passages {
        if touched.insert(p.document_id.as_str()) {
            metadata.touch_access(&p.document_id, now).await?;
        }
    }

    Ok(passages)
}

/// Render passages as a numbered context block for a chat prompt.
///
/// ```text
/// [Context 1 - Source: notes/todo.md, Tier: core, Relevance: 1.23]
/// passage text
/// ```
pub fn format_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "[Context {} - Source: {}, Tier: {}, Relevance: {:.2}]\n{}\n",
                i + 1,
                p.source.as_deref().unwrap_or(&p.document_id),
                p.tier,
                p.score,
                p.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
