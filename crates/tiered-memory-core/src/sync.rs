//! Remote-source contract and sync planning.
//!
//! A [`RemoteSource`] exposes a flat listing of files with a fingerprint
//! and parent folder, plus a way to fetch a file as plain text.
//! [`plan_sync`] diffs a listing against the persisted
//! [`SyncStateEntry`]s and sorts every file into exactly one bucket:
//!
//! | Bucket | Condition |
//! |--------|-----------|
//! | `new` | remote id never seen |
//! | `changed` | fingerprint, modified time, or mapped tier differs |
//! | `unchanged` | tracked and identical |
//! | `removed` | tracked but absent from the listing |
//! | `skipped` | parent folder has no tier mapping |
//!
//! Execution (fetch, ingest, delete, state commit) lives in the app crate.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;

use crate::models::Tier;
use crate::store::SyncStateEntry;

/// One file as reported by a remote listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub remote_id: String,
    pub name: String,
    pub fingerprint: String,
    pub modified_time: Option<String>,
    /// Name of the folder containing the file; selects the tier.
    pub parent_folder: String,
}

/// A remote document source.
///
/// Rate limiting and retries are the implementation's concern.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Stable name used to scope persisted sync state.
    fn name(&self) -> &str;

    async fn list(&self) -> anyhow::Result<Vec<RemoteFile>>;

    /// Content of `remote_id` as plain text. Rich formats are exported to
    /// text by the source.
    async fn fetch(&self, remote_id: &str) -> anyhow::Result<String>;
}

/// A file that needs ingesting, with the tier it maps to.
#[derive(Debug, Clone)]
pub struct PlannedFile {
    pub file: RemoteFile,
    pub tier: Tier,
    /// The prior state for changed files.
    pub previous: Option<SyncStateEntry>,
}

/// Result of diffing a listing against persisted state.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub new: Vec<PlannedFile>,
    pub changed: Vec<PlannedFile>,
    /// Tracked entries whose remote file is gone.
    pub removed: Vec<SyncStateEntry>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<RemoteFile>,
}

/// Counts reported by a sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl SyncPlan {
    /// Counts a dry run reports: what a full pass would attempt.
    pub fn dry_run_report(&self) -> SyncReport {
        SyncReport {
            added: self.new.len(),
            updated: self.changed.len(),
            removed: self.removed.len(),
            failed: 0,
            unchanged: self.unchanged.len(),
            skipped: self.skipped.len(),
        }
    }
}

/// Diff `listing` against `state` (keyed by remote id).
///
/// Output order follows the listing; `removed` is sorted by remote id.
/// When a listing reports the same remote id twice, the first occurrence
/// wins.
pub fn plan_sync(
    listing: Vec<RemoteFile>,
    state: &HashMap<String, SyncStateEntry>,
    folders: &HashMap<String, Tier>,
) -> SyncPlan {
    let mut plan = SyncPlan::default();
    let mut seen: HashSet<String> = HashSet::new();

    for file in listing {
        if !seen.insert(file.remote_id.clone()) {
            tracing::warn!(remote_id = %file.remote_id, "duplicate remote id in listing, ignoring");
            continue;
        }

        let tier = match folders.get(&file.parent_folder) {
            Some(tier) => *tier,
            None => {
                tracing::debug!(
                    remote_id = %file.remote_id,
                    folder = %file.parent_folder,
                    "skipping file in unmapped folder"
                );
                plan.skipped.push(file);
                continue;
            }
        };

        match state.get(&file.remote_id) {
            None => plan.new.push(PlannedFile {
                file,
                tier,
                previous: None,
            }),
            Some(prev) => {
                let differs = prev.fingerprint != file.fingerprint
                    || prev.modified_time != file.modified_time
                    || prev.tier != tier;
                if differs {
                    plan.changed.push(PlannedFile {
                        file,
                        tier,
                        previous: Some(prev.clone()),
                    });
                } else {
                    plan.unchanged.push(file.remote_id);
                }
            }
        }
    }

    // Files that moved into an unmapped folder are still present remotely;
    // they are skipped, not removed.
    let mut removed: Vec<SyncStateEntry> = state
        .values()
        .filter(|e| !seen.contains(&e.remote_id))
        .cloned()
        .collect();
    removed.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));
    plan.removed = removed;

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, fingerprint: &str, folder: &str) -> RemoteFile {
        RemoteFile {
            remote_id: id.to_string(),
            name: format!("{id}.txt"),
            fingerprint: fingerprint.to_string(),
            modified_time: Some("2024-01-01T00:00:00Z".to_string()),
            parent_folder: folder.to_string(),
        }
    }

    fn entry(id: &str, fingerprint: &str, tier: Tier) -> SyncStateEntry {
        SyncStateEntry {
            source: "drive".to_string(),
            remote_id: id.to_string(),
            local_document_id: format!("doc-{id}"),
            fingerprint: fingerprint.to_string(),
            modified_time: Some("2024-01-01T00:00:00Z".to_string()),
            tier,
            last_synced_at: 0,
        }
    }

    fn folders() -> HashMap<String, Tier> {
        HashMap::from([
            ("Core".to_string(), Tier::Core),
            ("Ref".to_string(), Tier::Reference),
            ("Tmp".to_string(), Tier::Ephemeral),
        ])
    }

    fn state(entries: Vec<SyncStateEntry>) -> HashMap<String, SyncStateEntry> {
        entries
            .into_iter()
            .map(|e| (e.remote_id.clone(), e))
            .collect()
    }

    #[test]
    fn test_new_changed_removed_are_disjoint() {
        let prior = state(vec![
            entry("same", "f1", Tier::Reference),
            entry("edit", "old", Tier::Reference),
            entry("gone", "f3", Tier::Core),
        ]);
        let listing = vec![
            file("same", "f1", "Ref"),
            file("edit", "new", "Ref"),
            file("fresh", "f4", "Tmp"),
        ];
        let plan = plan_sync(listing, &prior, &folders());

        assert_eq!(plan.new.len(), 1);
        assert_eq!(plan.new[0].file.remote_id, "fresh");
        assert_eq!(plan.new[0].tier, Tier::Ephemeral);
        assert_eq!(plan.changed.len(), 1);
        assert_eq!(plan.changed[0].file.remote_id, "edit");
        assert_eq!(
            plan.changed[0].previous.as_ref().map(|p| p.local_document_id.as_str()),
            Some("doc-edit")
        );
        assert_eq!(plan.removed.len(), 1);
        assert_eq!(plan.removed[0].remote_id, "gone");
        assert_eq!(plan.unchanged, vec!["same".to_string()]);
        assert!(plan.skipped.is_empty());

        let report = plan.dry_run_report();
        assert_eq!((report.added, report.updated, report.removed, report.failed), (1, 1, 1, 0));
    }

    #[test]
    fn test_modified_time_change_counts_as_changed() {
        let prior = state(vec![entry("a", "f", Tier::Core)]);
        let mut f = file("a", "f", "Core");
        f.modified_time = Some("2024-02-01T00:00:00Z".to_string());
        let plan = plan_sync(vec![f], &prior, &folders());
        assert_eq!(plan.changed.len(), 1);
    }

    #[test]
    fn test_folder_move_changes_tier() {
        let prior = state(vec![entry("a", "f", Tier::Ephemeral)]);
        let plan = plan_sync(vec![file("a", "f", "Core")], &prior, &folders());
        assert_eq!(plan.changed.len(), 1);
        assert_eq!(plan.changed[0].tier, Tier::Core);
    }

    #[test]
    fn test_unmapped_folder_is_skipped_not_removed() {
        let prior = state(vec![entry("a", "f", Tier::Core)]);
        let plan = plan_sync(
            vec![file("a", "f", "Elsewhere"), file("b", "g", "Elsewhere")],
            &prior,
            &folders(),
        );
        assert_eq!(plan.skipped.len(), 2);
        assert!(plan.removed.is_empty());
        assert!(plan.new.is_empty());
    }

    #[test]
    fn test_duplicate_remote_ids_first_wins() {
        let plan = plan_sync(
            vec![file("a", "first", "Core"), file("a", "second", "Ref")],
            &HashMap::new(),
            &folders(),
        );
        assert_eq!(plan.new.len(), 1);
        assert_eq!(plan.new[0].file.fingerprint, "first");
    }

    #[test]
    fn test_empty_listing_removes_everything() {
        let prior = state(vec![entry("b", "f", Tier::Core), entry("a", "f", Tier::Core)]);
        let plan = plan_sync(Vec::new(), &prior, &folders());
        let ids: Vec<&str> = plan.removed.iter().map(|e| e.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
