//! Enrichment run: processed layer in, analysis-ready output layer out.
//!
//! The engine widens the view beyond the target date by pulling the
//! previous `window_days` of processed partitions, so per-story
//! velocity and peak metrics reflect multi-day evolution rather than
//! a single snapshot. Only rows belonging to the target date survive
//! into the output layer.
//!
//! Stories gain:
//!
//! | Column | Meaning |
//! |--------------------------|--------------------------------------------|
//! | `score_velocity` | score delta vs the previous observation |
//! | `comment_velocity` | descendants delta vs the previous observation|
//! | `observations_in_window` | observations of this id in the window |
//! | `hours_to_peak` | hours from posting to the first score maximum |
//! | `is_long_tail` | still gathering comments after 48 hours |
//! | `dominant_topics` | comma-joined top TF-IDF terms from the title |
//!
//! Comments gain `sentiment_score` and `sentiment_label` from VADER
//! over their HTML-stripped text.

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use vader_sentiment::SentimentIntensityAnalyzer;

use crate::lake::{LakeFormat, LakeLoader, LakeWriter, Layer};
use crate::models::{coerce_f64, field, field_i64, field_str, Record};
use crate::process::dedup_keep_last;
use crate::quality_runner::QualityRunner;
use crate::text::{clean_html, tokenize, TfidfModel};

/// Hours after which a story still gathering comments counts as
/// long-tail.
const LONG_TAIL_HOURS: f64 = 48.0;

/// Vocabulary cap for title topic extraction.
const TOPIC_VOCABULARY_SIZE: usize = 100;

/// Sentiment compound score cutoffs, matching the VADER convention.
const SENTIMENT_POSITIVE: f64 = 0.05;
const SENTIMENT_NEGATIVE: f64 = -0.05;

/// Counters for one enrichment run.
#[derive(Debug, Default)]
pub struct TransformStats {
    pub window_stories: usize,
    pub comments_loaded: usize,
    pub stories_written: usize,
    pub comments_written: usize,
}

pub struct Transformer {
    loader: LakeLoader,
    writer: LakeWriter,
    quality: QualityRunner,
    window_days: i64,
    top_n_topics: usize,
}

impl Transformer {
    pub fn new(
        loader: LakeLoader,
        writer: LakeWriter,
        window_days: i64,
        top_n_topics: usize,
    ) -> Self {
        Self {
            loader,
            writer,
            quality: QualityRunner::new(),
            window_days,
            top_n_topics,
        }
    }

    pub async fn run(&self, date: NaiveDate) -> Result<TransformStats> {
        let mut stats = TransformStats::default();

        let stories = self.load_window("stories", date).await?;
        // Comments carry no temporal metrics, so only the target
        // partition is loaded and scored.
        let mut comments = self
            .loader
            .load_partition(Layer::Processed, "comments", date, LakeFormat::Snapshot)
            .await?;
        stats.window_stories = stories.len();
        stats.comments_loaded = comments.len();

        if stories.is_empty() && comments.is_empty() {
            warn!(%date, "no processed data for this date, nothing to enrich");
            return Ok(stats);
        }

        let mut stories = enrich_stories_temporal(stories, date);
        add_topics(&mut stories, self.top_n_topics);
        add_sentiment(&mut comments);

        // Each entity's report lands before its gate runs; an entity
        // with no rows this date is skipped rather than gated.
        if stories.is_empty() {
            warn!(%date, "no stories to enrich, skipping story quality checks");
        } else {
            let report = self.quality.build_report(
                "stories",
                date,
                self.quality.run_enriched_story_checks(&stories),
            );
            self.writer
                .save_quality_report(Layer::Output, "stories", date, &report)
                .await?;
            self.quality.enforce_gate("stories", &report)?;
            self.writer
                .save(Layer::Output, "stories", date, LakeFormat::Snapshot, &stories)
                .await?;
            stats.stories_written = stories.len();
        }

        if comments.is_empty() {
            warn!(%date, "no comments to enrich, skipping comment quality checks");
        } else {
            let report = self.quality.build_report(
                "comments",
                date,
                self.quality.run_enriched_comment_checks(&comments),
            );
            self.writer
                .save_quality_report(Layer::Output, "comments", date, &report)
                .await?;
            self.quality.enforce_gate("comments", &report)?;
            self.writer
                .save(Layer::Output, "comments", date, LakeFormat::Snapshot, &comments)
                .await?;
            stats.comments_written = comments.len();
        }

        info!(
            stories = stats.stories_written,
            comments = stats.comments_written,
            window_days = self.window_days,
            "enrichment complete"
        );
        Ok(stats)
    }

    /// Load the target partition plus up to `window_days` prior days.
    /// Missing historical partitions are expected and skipped.
    async fn load_window(&self, entity: &str, date: NaiveDate) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for days_back in (1..=self.window_days).rev() {
            let day = date - chrono::Duration::days(days_back);
            let batch = self
                .loader
                .load_partition(Layer::Processed, entity, day, LakeFormat::Snapshot)
                .await?;
            if !batch.is_empty() {
                debug!(entity, %day, count = batch.len(), "loaded historical partition");
                records.extend(batch);
            }
        }
        let target = self
            .loader
            .load_partition(Layer::Processed, entity, date, LakeFormat::Snapshot)
            .await?;
        records.extend(target);
        Ok(records)
    }
}

// ============ Temporal enrichment ============

fn dedup_and_sort(records: Vec<Record>) -> Vec<Record> {
    let mut records = dedup_keep_last(records);
    records.sort_by(|a, b| {
        let key = |r: &Record| {
            (
                field_i64(r, "id").unwrap_or(i64::MAX),
                field_str(r, "ingestion_date").unwrap_or("").to_string(),
            )
        };
        key(a).cmp(&key(b))
    });
    records
}

fn retain_target_date(records: &mut Vec<Record>, date: NaiveDate) {
    let target = date.to_string();
    records.retain(|r| field_str(r, "ingestion_date") == Some(target.as_str()));
}

/// Compute velocity and peak metrics over the whole window, then keep
/// only the target date's rows.
fn enrich_stories_temporal(records: Vec<Record>, date: NaiveDate) -> Vec<Record> {
    let mut records = dedup_and_sort(records);

    // Normalize metrics so arithmetic below never sees strings.
    for record in records.iter_mut() {
        for column in ["score", "descendants"] {
            let v = coerce_f64(field(record, column)).unwrap_or(0.0);
            record.insert(column.to_string(), Value::from(v));
        }
    }

    // Group row indices by story id; rows are already date-ordered.
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        if let Some(id) = field_i64(record, "id") {
            groups.entry(id).or_default().push(i);
        }
    }

    for indices in groups.values() {
        let observations = indices.len();

        // Peak is the first date the maximum score was observed.
        let mut peak_idx = indices[0];
        let mut peak_score = f64::MIN;
        for &i in indices {
            let score = coerce_f64(field(&records[i], "score")).unwrap_or(0.0);
            if score > peak_score {
                peak_score = score;
                peak_idx = i;
            }
        }
        let peak_date: Option<NaiveDate> =
            field_str(&records[peak_idx], "ingestion_date").and_then(|s| s.parse().ok());

        let mut prev: Option<(f64, f64)> = None;
        for &i in indices {
            let row_date: Option<NaiveDate> =
                field_str(&records[i], "ingestion_date").and_then(|s| s.parse().ok());
            let score = coerce_f64(field(&records[i], "score")).unwrap_or(0.0);
            let descendants = coerce_f64(field(&records[i], "descendants")).unwrap_or(0.0);

            let (score_velocity, comment_velocity) = match prev {
                Some((prev_score, prev_desc)) => (score - prev_score, descendants - prev_desc),
                None => (0.0, 0.0),
            };
            prev = Some((score, descendants));

            let creation = field_i64(&records[i], "time");
            let hours_since_creation = match (creation, row_date) {
                (Some(t), Some(d)) => Some(round2(hours_between(t, d))),
                _ => None,
            };
            let hours_to_peak = match (creation, peak_date) {
                (Some(t), Some(d)) => Some(round2(hours_between(t, d))),
                _ => None,
            };
            // Unknown creation time means the long-tail test cannot
            // fire. The row's age is a helper value, not a persisted
            // column.
            let is_long_tail = hours_since_creation
                .is_some_and(|h| h > LONG_TAIL_HOURS && comment_velocity > 0.0);

            let record = &mut records[i];
            record.insert("score_velocity".to_string(), Value::from(score_velocity));
            record.insert("comment_velocity".to_string(), Value::from(comment_velocity));
            record.insert(
                "observations_in_window".to_string(),
                Value::from(observations as i64),
            );
            record.insert(
                "hours_to_peak".to_string(),
                hours_to_peak.map(Value::from).unwrap_or(Value::Null),
            );
            record.insert("is_long_tail".to_string(), Value::from(is_long_tail));
        }
    }

    retain_target_date(&mut records, date);
    records
}

/// Hours from a Unix creation timestamp to a date's midnight UTC,
/// clipped at zero so same-day observations never go negative.
fn hours_between(creation_epoch: i64, date: NaiveDate) -> f64 {
    let midnight = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    ((midnight - creation_epoch) as f64 / 3600.0).max(0.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

// ============ Topics ============

/// Attach a `dominant_topics` column: the comma-joined top TF-IDF
/// terms of each story's title. Null for a story with no usable
/// terms, and null throughout when no title yields any vocabulary.
fn add_topics(stories: &mut [Record], top_n: usize) {
    let docs: Vec<Vec<String>> = stories
        .iter()
        .map(|r| tokenize(field_str(r, "title").unwrap_or("")))
        .collect();

    let Some(model) = TfidfModel::fit(&docs, TOPIC_VOCABULARY_SIZE) else {
        for record in stories.iter_mut() {
            record.insert("dominant_topics".to_string(), Value::Null);
        }
        return;
    };

    for (record, doc) in stories.iter_mut().zip(&docs) {
        let terms = model.top_terms(doc, top_n);
        let value = if terms.is_empty() {
            Value::Null
        } else {
            Value::from(terms.join(","))
        };
        record.insert("dominant_topics".to_string(), value);
    }
}

// ============ Sentiment ============

/// Attach `sentiment_score` and `sentiment_label` from VADER over
/// each comment's HTML-stripped text. Empty text is neutral with a
/// score of zero.
fn add_sentiment(comments: &mut [Record]) {
    if comments.is_empty() {
        return;
    }
    let analyzer = SentimentIntensityAnalyzer::new();

    for record in comments.iter_mut() {
        let text = clean_html(field_str(record, "text").unwrap_or(""));
        let (score, label) = if text.is_empty() {
            (0.0, "neutral")
        } else {
            let scores = analyzer.polarity_scores(&text);
            let compound = round4(scores.get("compound").copied().unwrap_or(0.0));
            let label = if compound >= SENTIMENT_POSITIVE {
                "positive"
            } else if compound <= SENTIMENT_NEGATIVE {
                "negative"
            } else {
                "neutral"
            };
            (compound, label)
        };
        record.insert("sentiment_score".to_string(), Value::from(score));
        record.insert("sentiment_label".to_string(), Value::from(label));
    }
}
