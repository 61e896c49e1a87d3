//! Multi-day story tracking.
//!
//! Stories stay interesting after they leave the top list: scores and
//! comment counts keep moving for days. The tracker keeps a rolling
//! window of story ids in a single JSON object in the lake's metadata
//! area, so each ingestion run can re-fetch stories discovered on
//! previous days and observe how their metrics evolve.
//!
//! The tracking file is a full snapshot rewritten atomically on every
//! run. Loading is fail-open: a missing or corrupt file yields an
//! empty tracking set and the pipeline rebuilds state from scratch,
//! because ingestion must never be blocked by its own bookkeeping.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::store::ObjectStore;

pub const TRACKING_KEY: &str = "metadata/story_tracking.json";

/// Threshold below which a descendants increase is not worth recording.
const DESCENDANTS_DELTA_THRESHOLD: i64 = 5;

/// One tracked story's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub first_seen: NaiveDate,
    pub last_updated: NaiveDate,
    pub last_score: i64,
    pub last_descendants: i64,
}

/// Latest metrics observed for a story during the current run.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoryMetrics {
    pub score: i64,
    pub descendants: i64,
}

/// On-disk layout of the tracking file. Story ids are string keys so
/// the file stays a plain JSON object.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackingFile {
    last_updated: String,
    total_stories: usize,
    stories: BTreeMap<String, TrackingEntry>,
}

pub struct StoryTracker {
    store: Arc<dyn ObjectStore>,
    tracking_days: i64,
}

impl StoryTracker {
    pub fn new(store: Arc<dyn ObjectStore>, tracking_days: i64) -> Self {
        Self {
            store,
            tracking_days,
        }
    }

    /// Load the tracking set. Missing or corrupt files yield an empty
    /// set; expiry happens in [`StoryTracker::update`], not here, so a
    /// pure read never mutates state.
    pub async fn load_active(&self) -> Result<BTreeMap<i64, TrackingEntry>> {
        let bytes = match self.store.get(TRACKING_KEY).await? {
            Some(bytes) => bytes,
            None => {
                info!("no tracking file yet, starting empty");
                return Ok(BTreeMap::new());
            }
        };

        let file: TrackingFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "tracking file is corrupt, starting empty");
                return Ok(BTreeMap::new());
            }
        };

        let mut active = BTreeMap::new();
        for (id_str, entry) in file.stories {
            let Ok(id) = id_str.parse::<i64>() else {
                warn!(id = %id_str, "dropping tracking entry with non-numeric id");
                continue;
            };
            active.insert(id, entry);
        }

        info!(active = active.len(), "loaded story tracking");
        Ok(active)
    }

    /// The ids currently tracked, loading the file when no set is
    /// supplied.
    pub async fn tracked_ids(
        &self,
        active: Option<&BTreeMap<i64, TrackingEntry>>,
    ) -> Result<BTreeSet<i64>> {
        match active {
            Some(map) => Ok(map.keys().copied().collect()),
            None => Ok(self.load_active().await?.keys().copied().collect()),
        }
    }

    /// Fold this run's observations into the tracking set.
    ///
    /// An entry is rewritten on a significant change: any score
    /// movement, or at least 5 new descendants. An entry
    /// without a significant change is kept only while its
    /// `last_updated` is within the tracking window; a story whose
    /// metrics keep moving therefore stays tracked indefinitely.
    /// Tracked ids absent from `metrics` are carried over unchanged so
    /// a transient fetch failure does not erase history. Ids in
    /// `newly_seen` that are not yet tracked start a fresh window
    /// today, with metrics defaulting to zero.
    pub fn update(
        &self,
        mut active: BTreeMap<i64, TrackingEntry>,
        newly_seen: &BTreeSet<i64>,
        metrics: &BTreeMap<i64, StoryMetrics>,
        today: NaiveDate,
    ) -> BTreeMap<i64, TrackingEntry> {
        let mut expired = 0usize;
        active.retain(|id, entry| {
            if let Some(m) = metrics.get(id) {
                let score_changed = m.score != entry.last_score;
                let descendants_moved =
                    m.descendants - entry.last_descendants >= DESCENDANTS_DELTA_THRESHOLD;
                if score_changed || descendants_moved {
                    entry.last_score = m.score;
                    entry.last_descendants = m.descendants;
                    entry.last_updated = today;
                    return true;
                }
            }
            if (today - entry.last_updated).num_days() >= self.tracking_days {
                expired += 1;
                return false;
            }
            true
        });
        if expired > 0 {
            info!(expired, "expired stale tracking entries");
        }

        for id in newly_seen {
            let m = metrics.get(id).copied().unwrap_or_default();
            active.entry(*id).or_insert_with(|| TrackingEntry {
                first_seen: today,
                last_updated: today,
                last_score: m.score,
                last_descendants: m.descendants,
            });
        }

        active
    }

    /// Write the full tracking snapshot back to the lake.
    pub async fn save(
        &self,
        active: &BTreeMap<i64, TrackingEntry>,
        today: NaiveDate,
    ) -> Result<()> {
        let file = TrackingFile {
            last_updated: today.to_string(),
            total_stories: active.len(),
            stories: active
                .iter()
                .map(|(id, entry)| (id.to_string(), entry.clone()))
                .collect(),
        };
        let body = serde_json::to_vec_pretty(&file).context("Failed to encode tracking file")?;
        self.store
            .put(TRACKING_KEY, body, "application/json")
            .await
            .context("Failed to save tracking file")?;
        info!(tracked = active.len(), "saved story tracking");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_fs::FsStore;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn tracker_with_store() -> (tempfile::TempDir, StoryTracker) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsStore::new(dir.path()).unwrap());
        (dir, StoryTracker::new(store, 7))
    }

    fn entry(first_seen: &str, score: i64, descendants: i64) -> TrackingEntry {
        TrackingEntry {
            first_seen: date(first_seen),
            last_updated: date(first_seen),
            last_score: score,
            last_descendants: descendants,
        }
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let (_dir, tracker) = tracker_with_store();
        let active = tracker.load_active().await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let (_dir, tracker) = tracker_with_store();
        tracker
            .store
            .put(TRACKING_KEY, b"not json".to_vec(), "application/json")
            .await
            .unwrap();
        let active = tracker.load_active().await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let (_dir, tracker) = tracker_with_store();
        let mut active = BTreeMap::new();
        active.insert(1, entry("2026-01-31", 100, 20));
        active.insert(2, entry("2026-01-20", 50, 5));
        tracker.save(&active, date("2026-02-01")).await.unwrap();

        let loaded = tracker.load_active().await.unwrap();
        assert_eq!(loaded, active);

        let ids = tracker.tracked_ids(None).await.unwrap();
        assert_eq!(ids, BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_update_requires_significant_change() {
        let (_dir, tracker) = tracker_with_store();
        let mut active = BTreeMap::new();
        active.insert(1, entry("2026-01-30", 100, 20));
        active.insert(2, entry("2026-01-30", 50, 10));
        active.insert(3, entry("2026-01-30", 50, 10));

        let mut metrics = BTreeMap::new();
        // Same score, 3 new descendants: below threshold.
        metrics.insert(1, StoryMetrics { score: 100, descendants: 23 });
        // Score moved: significant.
        metrics.insert(2, StoryMetrics { score: 55, descendants: 10 });
        // Exactly 5 new descendants: significant.
        metrics.insert(3, StoryMetrics { score: 50, descendants: 15 });

        let updated = tracker.update(active, &BTreeSet::new(), &metrics, date("2026-02-01"));
        assert_eq!(updated[&1].last_descendants, 20);
        assert_eq!(updated[&1].last_updated, date("2026-01-30"));
        assert_eq!(updated[&2].last_score, 55);
        assert_eq!(updated[&2].last_updated, date("2026-02-01"));
        assert_eq!(updated[&3].last_descendants, 15);
        assert_eq!(updated[&3].last_updated, date("2026-02-01"));
    }

    #[test]
    fn test_update_expires_stale_entries() {
        let (_dir, tracker) = tracker_with_store();
        let mut active = BTreeMap::new();
        // Unchanged for 12 days: past the 7-day window.
        active.insert(1, entry("2026-01-20", 100, 20));
        // Unchanged but recent.
        active.insert(2, entry("2026-01-30", 50, 10));
        // Old but still moving: stays tracked.
        let mut metrics = BTreeMap::new();
        active.insert(3, entry("2026-01-20", 10, 0));
        metrics.insert(3, StoryMetrics { score: 90, descendants: 0 });

        let updated = tracker.update(active, &BTreeSet::new(), &metrics, date("2026-02-01"));
        assert!(!updated.contains_key(&1));
        assert!(updated.contains_key(&2));
        assert_eq!(updated[&3].last_updated, date("2026-02-01"));
    }

    #[test]
    fn test_update_carries_over_unfetched_entries() {
        let (_dir, tracker) = tracker_with_store();
        let mut active = BTreeMap::new();
        active.insert(1, entry("2026-01-30", 100, 20));

        let updated = tracker.update(active, &BTreeSet::new(), &BTreeMap::new(), date("2026-02-01"));
        assert_eq!(updated[&1], entry("2026-01-30", 100, 20));
    }

    #[test]
    fn test_update_starts_window_for_new_ids() {
        let (_dir, tracker) = tracker_with_store();
        let mut metrics = BTreeMap::new();
        metrics.insert(9, StoryMetrics { score: 12, descendants: 1 });

        let updated = tracker.update(
            BTreeMap::new(),
            &BTreeSet::from([9, 10]),
            &metrics,
            date("2026-02-01"),
        );
        let e = &updated[&9];
        assert_eq!(e.first_seen, date("2026-02-01"));
        assert_eq!(e.last_score, 12);
        // Newly seen without metrics starts at zero.
        assert_eq!(updated[&10].last_score, 0);
    }
}
