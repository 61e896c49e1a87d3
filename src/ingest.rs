//! Ingestion run: fetch stories and comments, land them in the raw
//! layer, and roll the tracking window forward.
//!
//! One run does, in order:
//!
//! 1. Load the active tracking set and re-fetch every tracked story,
//!    so multi-day metric evolution is observed.
//! 2. Fetch the current top stories from the last week.
//! 3. Merge the two sets by id. A re-fetched tracked story wins over
//!    the top-list copy of the same id, its metrics being at least as
//!    fresh.
//! 4. Fold observed metrics and newly discovered ids into the
//!    tracker and persist it.
//! 5. Write stories to `raw/stories/`, then fan out over the comment
//!    trees of stories still under tracking and write comments to
//!    `raw/comments/` in batches.

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::fetcher::{fetch_comments_for_story, fetch_top_stories_from_last_week};
use crate::hn_client::HnClient;
use crate::lake::{LakeFormat, LakeWriter, Layer};
use crate::models::Record;
use crate::store::create_store;
use crate::tracker::{StoryMetrics, StoryTracker};

/// Comments are flushed to the raw layer whenever this many are
/// buffered, bounding memory on stories with huge threads.
pub const COMMENT_BATCH_SIZE: usize = 1000;

/// Counters for one ingestion run.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub tracked_refetched: usize,
    pub newly_discovered: usize,
    pub active_tracked: usize,
    pub stories_written: usize,
    pub comments_written: usize,
    pub comment_files: usize,
}

pub async fn run_ingest(config: &Config, date: NaiveDate) -> Result<IngestStats> {
    let store = create_store(&config.lake)?;
    let writer = LakeWriter::new(store.clone());
    let tracker = StoryTracker::new(store.clone(), config.tracking.tracking_days);
    let client = HnClient::new(
        config.api.base_url.clone(),
        config.api.max_retries,
        Duration::from_secs(config.api.timeout_secs),
        Duration::from_millis(config.api.request_delay_ms),
    )?;

    let mut stats = IngestStats::default();

    // Re-fetch tracked stories first.
    let active = tracker.load_active().await?;
    let tracked_ids = tracker.tracked_ids(Some(&active)).await?;

    let mut stories: BTreeMap<i64, Value> = BTreeMap::new();
    for &id in &tracked_ids {
        match client.item(id).await? {
            Some(item) if item.get("type").and_then(Value::as_str) == Some("story") => {
                stories.insert(id, item);
                stats.tracked_refetched += 1;
            }
            Some(_) => warn!(id, "tracked id is no longer a story, skipping"),
            None => warn!(id, "tracked story unavailable this run"),
        }
    }

    // Then the current top stories; tracked re-fetches win on overlap.
    let fresh = fetch_top_stories_from_last_week(&client, config.api.max_stories).await?;
    let mut newly_discovered: BTreeSet<i64> = BTreeSet::new();
    for item in fresh {
        let Some(id) = item.get("id").and_then(Value::as_i64) else {
            continue;
        };
        if !tracked_ids.contains(&id) {
            newly_discovered.insert(id);
        }
        stories.entry(id).or_insert(item);
    }
    stats.newly_discovered = newly_discovered.len();

    // Roll the tracking window forward with this run's observations.
    let metrics: BTreeMap<i64, StoryMetrics> = stories
        .iter()
        .map(|(&id, item)| {
            (
                id,
                StoryMetrics {
                    score: item.get("score").and_then(Value::as_i64).unwrap_or(0),
                    descendants: item.get("descendants").and_then(Value::as_i64).unwrap_or(0),
                },
            )
        })
        .collect();
    let updated = tracker.update(active, &newly_discovered, &metrics, date);
    tracker.save(&updated, date).await?;
    stats.active_tracked = updated.len();

    if stories.is_empty() {
        warn!("no stories fetched, nothing to land");
        return Ok(stats);
    }

    // Land stories.
    let story_records: Vec<Record> = stories
        .values()
        .filter_map(|v| v.as_object().cloned())
        .collect();
    writer
        .save(Layer::Raw, "stories", date, LakeFormat::Jsonl, &story_records)
        .await?;
    stats.stories_written = story_records.len();

    // Fan out over comment trees for stories still under tracking,
    // flushing in bounded batches.
    let mut batch: Vec<Record> = Vec::new();
    for (id, story) in &stories {
        if !updated.contains_key(id) {
            continue;
        }
        let comments =
            fetch_comments_for_story(&client, story, config.api.max_comment_depth).await?;
        for comment in comments {
            if let Some(obj) = comment.as_object() {
                batch.push(obj.clone());
            }
            if batch.len() >= COMMENT_BATCH_SIZE {
                writer
                    .save(Layer::Raw, "comments", date, LakeFormat::Jsonl, &batch)
                    .await?;
                stats.comments_written += batch.len();
                stats.comment_files += 1;
                batch.clear();
                // Distinct timestamps keep batch files from colliding.
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    if !batch.is_empty() {
        writer
            .save(Layer::Raw, "comments", date, LakeFormat::Jsonl, &batch)
            .await?;
        stats.comments_written += batch.len();
        stats.comment_files += 1;
    }

    info!(
        tracked = stats.tracked_refetched,
        new = stats.newly_discovered,
        stories = stats.stories_written,
        comments = stats.comments_written,
        "ingestion complete"
    );
    Ok(stats)
}
