//! Processing run: raw layer in, validated processed layer out.
//!
//! Normalization projects each raw item onto a fixed column schema,
//! drops rows missing their identity columns, deduplicates repeated
//! observations, and enforces referential integrity for comments.
//! Quality reports are persisted before the gate is enforced, so a
//! failed run still leaves its evidence in the lake.

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::lake::{LakeFormat, LakeLoader, LakeWriter, Layer};
use crate::models::{
    coerce_i64, field, field_i64, field_str, Record, COMMENT_COLUMNS_V1, STORY_COLUMNS_V1,
};
use crate::quality_runner::QualityRunner;

/// Counters for one processing run.
#[derive(Debug, Default)]
pub struct ProcessStats {
    pub raw_stories: usize,
    pub raw_comments: usize,
    pub dropped_stories: usize,
    pub dropped_comments: usize,
    pub orphaned_comments: usize,
    pub stories_written: usize,
    pub comments_written: usize,
}

pub struct Processor {
    loader: LakeLoader,
    writer: LakeWriter,
    quality: QualityRunner,
}

impl Processor {
    pub fn new(loader: LakeLoader, writer: LakeWriter) -> Self {
        Self {
            loader,
            writer,
            quality: QualityRunner::new(),
        }
    }

    pub async fn run(&self, date: NaiveDate) -> Result<ProcessStats> {
        let mut stats = ProcessStats::default();

        let raw_stories = self
            .loader
            .load_partition(Layer::Raw, "stories", date, LakeFormat::Jsonl)
            .await?;
        let raw_comments = self
            .loader
            .load_partition(Layer::Raw, "comments", date, LakeFormat::Jsonl)
            .await?;
        stats.raw_stories = raw_stories.len();
        stats.raw_comments = raw_comments.len();

        if raw_stories.is_empty() && raw_comments.is_empty() {
            warn!(%date, "no raw data for this date, nothing to process");
            return Ok(stats);
        }

        // Normalize onto the fixed schemas.
        let (mut stories, dropped) = normalize(&raw_stories, STORY_COLUMNS_V1, &["id"], date);
        stats.dropped_stories = dropped;
        let (mut comments, dropped) =
            normalize(&raw_comments, COMMENT_COLUMNS_V1, &["id", "parent"], date);
        stats.dropped_comments = dropped;

        stories = dedup_keep_last(stories);
        comments = dedup_keep_last(comments);

        // A comment's parent must resolve to a story or another
        // comment seen this run. Orphans are dropped, not failed: the
        // depth cutoff legitimately truncates trees.
        let known_ids: HashSet<i64> = stories
            .iter()
            .chain(comments.iter())
            .filter_map(|r| field_i64(r, "id"))
            .collect();
        let before = comments.len();
        comments.retain(|c| {
            field_i64(c, "parent").is_some_and(|p| known_ids.contains(&p))
        });
        stats.orphaned_comments = before - comments.len();

        // Batteries run on the final record sets; each entity's report
        // lands in the lake before its gate can abort. An entity with
        // no rows this date is skipped rather than gated.
        if stories.is_empty() {
            warn!(%date, "no processed stories, skipping story quality checks");
        } else {
            let story_checks = self.quality.run_story_checks(&stories);
            let story_report = self.quality.build_report("stories", date, story_checks);
            self.writer
                .save_quality_report(Layer::Processed, "stories", date, &story_report)
                .await?;
            self.quality.enforce_gate("stories", &story_report)?;
            self.writer
                .save(Layer::Processed, "stories", date, LakeFormat::Snapshot, &stories)
                .await?;
            stats.stories_written = stories.len();
        }

        if comments.is_empty() {
            warn!(%date, "no processed comments, skipping comment quality checks");
        } else {
            let mut parent_pool = stories.clone();
            parent_pool.extend(comments.iter().cloned());
            let comment_checks = self.quality.run_comment_checks(&comments, &parent_pool);
            let comment_report = self.quality.build_report("comments", date, comment_checks);
            self.writer
                .save_quality_report(Layer::Processed, "comments", date, &comment_report)
                .await?;
            self.quality.enforce_gate("comments", &comment_report)?;
            self.writer
                .save(Layer::Processed, "comments", date, LakeFormat::Snapshot, &comments)
                .await?;
            stats.comments_written = comments.len();
        }

        info!(
            stories = stats.stories_written,
            comments = stats.comments_written,
            dropped = stats.dropped_stories + stats.dropped_comments,
            orphaned = stats.orphaned_comments,
            "processing complete"
        );
        Ok(stats)
    }
}

/// Project raw records onto a column schema and stamp the partition
/// date.
///
/// Rows whose `required` columns do not coerce to an integer are
/// dropped and counted. `time`, `score`, and `descendants` are
/// normalized to numbers where present; `score` and `descendants`
/// default to 0 since the API omits them for zero values.
fn normalize(
    raw: &[Record],
    columns: &[&str],
    required: &[&str],
    date: NaiveDate,
) -> (Vec<Record>, usize) {
    let mut out = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;

    'rows: for row in raw {
        let mut record = Record::new();
        for &column in columns {
            let raw_value = field(row, column);
            let value = match column {
                c if required.contains(&c) => match coerce_i64(raw_value) {
                    Some(v) => Value::from(v),
                    None => {
                        dropped += 1;
                        continue 'rows;
                    }
                },
                "time" => coerce_i64(raw_value).map(Value::from).unwrap_or(Value::Null),
                "score" | "descendants" => Value::from(coerce_i64(raw_value).unwrap_or(0)),
                _ => raw_value.clone(),
            };
            record.insert(column.to_string(), value);
        }
        record.insert("ingestion_date".to_string(), Value::from(date.to_string()));
        out.push(record);
    }

    (out, dropped)
}

/// Keep only the last occurrence of each `(id, ingestion_date)` pair,
/// preserving relative order. Later observations carry fresher
/// metrics.
pub fn dedup_keep_last(records: Vec<Record>) -> Vec<Record> {
    let mut last_index: HashMap<(i64, String), usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        let Some(id) = field_i64(record, "id") else {
            continue;
        };
        let date = field_str(record, "ingestion_date").unwrap_or_default().to_string();
        last_index.insert((id, date), i);
    }

    records
        .into_iter()
        .enumerate()
        .filter(|(i, record)| {
            let Some(id) = field_i64(record, "id") else {
                // Rows without ids cannot be deduplicated; keep them
                // for the not-null check to flag.
                return true;
            };
            let date = field_str(record, "ingestion_date").unwrap_or_default().to_string();
            last_index.get(&(id, date)) == Some(i)
        })
        .map(|(_, record)| record)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_normalize_projects_schema_and_stamps_date() {
        let raw = rows(vec![json!({
            "id": 1, "type": "story", "time": 1_700_000_000i64,
            "title": "A story", "by": "alice",
            "unknown_field": "dropped",
        })]);
        let (records, dropped) = normalize(&raw, STORY_COLUMNS_V1, &["id"], date("2026-02-01"));
        assert_eq!(dropped, 0);
        let record = &records[0];
        assert_eq!(record["ingestion_date"], json!("2026-02-01"));
        assert_eq!(record["score"], json!(0));
        assert_eq!(record["url"], Value::Null);
        assert!(!record.contains_key("unknown_field"));
    }

    #[test]
    fn test_normalize_drops_rows_without_identity() {
        let raw = rows(vec![
            json!({"id": 1, "parent": 10}),
            json!({"id": null, "parent": 10}),
            json!({"id": 3, "parent": "bogus"}),
        ]);
        let (records, dropped) =
            normalize(&raw, COMMENT_COLUMNS_V1, &["id", "parent"], date("2026-02-01"));
        assert_eq!(records.len(), 1);
        assert_eq!(dropped, 2);
    }

    #[test]
    fn test_normalize_nulls_unparseable_time() {
        let raw = rows(vec![json!({"id": 1, "time": "yesterday"})]);
        let (records, _) = normalize(&raw, STORY_COLUMNS_V1, &["id"], date("2026-02-01"));
        assert_eq!(records[0]["time"], Value::Null);
    }

    #[test]
    fn test_dedup_keeps_last_occurrence() {
        let records = rows(vec![
            json!({"id": 1, "ingestion_date": "2026-02-01", "score": 10}),
            json!({"id": 2, "ingestion_date": "2026-02-01", "score": 5}),
            json!({"id": 1, "ingestion_date": "2026-02-01", "score": 40}),
        ]);
        let deduped = dedup_keep_last(records);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0]["id"], json!(2));
        assert_eq!(deduped[1]["score"], json!(40));
    }

    #[test]
    fn test_dedup_separates_dates() {
        let records = rows(vec![
            json!({"id": 1, "ingestion_date": "2026-02-01", "score": 10}),
            json!({"id": 1, "ingestion_date": "2026-02-02", "score": 40}),
        ]);
        assert_eq!(dedup_keep_last(records).len(), 2);
    }
}
