//! End-to-end pipeline tests over a temporary filesystem lake.
//!
//! Raw partitions are seeded directly, then the processing and
//! enrichment stages run through the library API exactly as the CLI
//! drives them.

use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;

use hn_lake::lake::{LakeFormat, LakeLoader, LakeWriter, Layer};
use hn_lake::models::Record;
use hn_lake::process::Processor;
use hn_lake::quality_runner::QualityGateError;
use hn_lake::store::ObjectStore;
use hn_lake::store_fs::FsStore;
use hn_lake::transform::Transformer;

// 2026-01-30 00:00:00 UTC
const T0: i64 = 1_769_731_200;

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn records(values: Vec<Value>) -> Vec<Record> {
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect()
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<dyn ObjectStore>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsStore::new(dir.path()).unwrap());
        Self { _dir: dir, store }
    }

    fn loader(&self) -> LakeLoader {
        LakeLoader::new(self.store.clone())
    }

    fn writer(&self) -> LakeWriter {
        LakeWriter::new(self.store.clone())
    }

    async fn seed_raw(&self, entity: &str, day: NaiveDate, rows: Vec<Value>) {
        self.writer()
            .save(Layer::Raw, entity, day, LakeFormat::Jsonl, &records(rows))
            .await
            .unwrap();
    }
}

fn raw_story(id: i64, title: &str, score: i64, descendants: i64) -> Value {
    json!({
        "id": id,
        "type": "story",
        "by": "alice",
        "time": T0,
        "title": title,
        "url": format!("https://example.com/{id}"),
        "score": score,
        "descendants": descendants,
        "kids": [],
    })
}

fn raw_comment(id: i64, parent: i64, text: &str) -> Value {
    json!({
        "id": id,
        "type": "comment",
        "by": "bob",
        "time": T0 + 600,
        "text": text,
        "parent": parent,
    })
}

#[tokio::test]
async fn test_process_normalizes_and_validates_raw_partition() {
    let fx = Fixture::new();
    let day = date("2026-02-01");

    fx.seed_raw(
        "stories",
        day,
        vec![
            raw_story(100, "Rust compiler internals", 50, 2),
            // Duplicate observation: the fresher one must win.
            raw_story(100, "Rust compiler internals", 80, 3),
            // No id: dropped during normalization.
            json!({"type": "story", "time": T0, "title": "ghost"}),
        ],
    )
    .await;
    fx.seed_raw(
        "comments",
        day,
        vec![
            raw_comment(200, 100, "Great writeup, thank you!"),
            raw_comment(201, 200, "Agreed."),
            // Parent was never fetched: orphaned, dropped.
            raw_comment(202, 999, "Replying into the void"),
        ],
    )
    .await;

    let processor = Processor::new(fx.loader(), fx.writer());
    let stats = processor.run(day).await.unwrap();

    assert_eq!(stats.raw_stories, 3);
    assert_eq!(stats.dropped_stories, 1);
    assert_eq!(stats.stories_written, 1);
    assert_eq!(stats.orphaned_comments, 1);
    assert_eq!(stats.comments_written, 2);

    let stories = fx
        .loader()
        .load_partition(Layer::Processed, "stories", day, LakeFormat::Snapshot)
        .await
        .unwrap();
    assert_eq!(stories.len(), 1);
    let story = &stories[0];
    assert_eq!(story["id"], json!(100));
    assert_eq!(story["score"], json!(80));
    assert_eq!(story["ingestion_date"], json!("2026-02-01"));
    assert_eq!(story["by"], json!("alice"));

    // Quality reports landed alongside the data.
    let report_keys = fx
        .store
        .list("processed/quality_reports_stories/")
        .await
        .unwrap();
    assert_eq!(report_keys.len(), 1);
}

#[tokio::test]
async fn test_process_gate_blocks_partition_without_timestamps() {
    let fx = Fixture::new();
    let day = date("2026-02-01");

    // Stories with null time fail the critical not-null check.
    fx.seed_raw(
        "stories",
        day,
        vec![json!({"id": 1, "type": "story", "title": "no clock"})],
    )
    .await;

    let processor = Processor::new(fx.loader(), fx.writer());
    let err = processor.run(day).await.unwrap_err();
    let gate = err.downcast_ref::<QualityGateError>().unwrap();
    assert_eq!(gate.entity, "stories");

    // The report was written even though the run aborted.
    let report_keys = fx
        .store
        .list("processed/quality_reports_stories/")
        .await
        .unwrap();
    assert_eq!(report_keys.len(), 1);

    // No processed snapshot was written.
    let snapshot_keys = fx.store.list("processed/stories/").await.unwrap();
    assert!(snapshot_keys.is_empty());
}

#[tokio::test]
async fn test_transform_enriches_across_multi_day_window() {
    let fx = Fixture::new();
    let day1 = date("2026-01-30");
    let day2 = date("2026-02-01");

    // Two observation days for the same story, plus comments on the
    // target day.
    fx.seed_raw(
        "stories",
        day1,
        vec![raw_story(100, "Rust compiler internals", 10, 2)],
    )
    .await;
    fx.seed_raw(
        "stories",
        day2,
        vec![
            raw_story(100, "Rust compiler internals", 40, 12),
            raw_story(101, "Database storage engines compared", 5, 0),
        ],
    )
    .await;
    fx.seed_raw(
        "comments",
        day2,
        vec![
            raw_comment(200, 100, "<p>This is <b>absolutely wonderful</b>!</p>"),
            raw_comment(201, 100, "Terrible, misleading, awful benchmarks."),
        ],
    )
    .await;

    let processor = Processor::new(fx.loader(), fx.writer());
    processor.run(day1).await.unwrap();
    processor.run(day2).await.unwrap();

    let transformer = Transformer::new(fx.loader(), fx.writer(), 7, 3);
    let stats = transformer.run(day2).await.unwrap();
    assert_eq!(stats.stories_written, 2);
    assert_eq!(stats.comments_written, 2);

    let stories = fx
        .loader()
        .load_partition(Layer::Output, "stories", day2, LakeFormat::Snapshot)
        .await
        .unwrap();
    assert_eq!(stories.len(), 2);

    let by_id = |id: i64| {
        stories
            .iter()
            .find(|s| s["id"].as_i64() == Some(id) || s["id"].as_f64() == Some(id as f64))
            .unwrap()
    };

    // Story 100: up 30 points and 10 comments since day one.
    let s = by_id(100);
    assert_eq!(s["score_velocity"], json!(30.0));
    assert_eq!(s["comment_velocity"], json!(10.0));
    assert_eq!(s["observations_in_window"], json!(2));
    // Posted at midnight 2026-01-30; peak observed 2026-02-01.
    assert_eq!(s["hours_to_peak"], json!(48.0));
    assert!(s["dominant_topics"].is_string());

    // Story 101: a single observation.
    let s = by_id(101);
    assert_eq!(s["score_velocity"], json!(0.0));
    assert_eq!(s["observations_in_window"], json!(1));

    // Comment sentiment.
    let comments = fx
        .loader()
        .load_partition(Layer::Output, "comments", day2, LakeFormat::Snapshot)
        .await
        .unwrap();
    let by_id = |id: i64| {
        comments
            .iter()
            .find(|c| c["id"].as_i64() == Some(id))
            .unwrap()
    };
    assert_eq!(by_id(200)["sentiment_label"], json!("positive"));
    assert_eq!(by_id(201)["sentiment_label"], json!("negative"));
}

#[tokio::test]
async fn test_transform_on_empty_window_is_a_no_op() {
    let fx = Fixture::new();
    let transformer = Transformer::new(fx.loader(), fx.writer(), 7, 3);
    let stats = transformer.run(date("2026-02-01")).await.unwrap();
    assert_eq!(stats.window_stories, 0);
    assert_eq!(stats.stories_written, 0);
    assert!(fx.store.list("output/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stories_only_partition_flows_through_both_stages() {
    let fx = Fixture::new();
    let day = date("2026-02-01");

    // A day where comment ingestion produced nothing must still
    // process and enrich the stories it has.
    fx.seed_raw("stories", day, vec![raw_story(100, "Rust compiler internals", 50, 0)])
        .await;

    let processor = Processor::new(fx.loader(), fx.writer());
    let stats = processor.run(day).await.unwrap();
    assert_eq!(stats.stories_written, 1);
    assert_eq!(stats.comments_written, 0);

    let snapshot_keys = fx.store.list("processed/stories/").await.unwrap();
    assert_eq!(snapshot_keys.len(), 1);
    // The absent entity produced neither a report nor a snapshot.
    assert!(fx
        .store
        .list("processed/quality_reports_comments/")
        .await
        .unwrap()
        .is_empty());
    assert!(fx.store.list("processed/comments/").await.unwrap().is_empty());

    let transformer = Transformer::new(fx.loader(), fx.writer(), 7, 3);
    let stats = transformer.run(day).await.unwrap();
    assert_eq!(stats.stories_written, 1);
    assert_eq!(stats.comments_written, 0);

    let enriched = fx
        .loader()
        .load_partition(Layer::Output, "stories", day, LakeFormat::Snapshot)
        .await
        .unwrap();
    assert_eq!(enriched.len(), 1);
    assert_eq!(enriched[0]["observations_in_window"], json!(1));
    assert!(fx
        .store
        .list("output/quality_reports_comments/")
        .await
        .unwrap()
        .is_empty());
}
