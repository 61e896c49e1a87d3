//! Fixed quality batteries for each pipeline stage.
//!
//! Battery compositions are deliberately hardcoded rather than
//! configurable: if a partition needs a different contract, that is a
//! code change with review, not a config tweak.
//!
//! | Battery                  | Critical checks                           | Warnings                                          |
//! |--------------------------|-------------------------------------------|---------------------------------------------------|
//! | stories, post-process    | not_null, unique(id, ingestion_date)      | score >= 0, descendants >= 0, volume              |
//! | comments, post-process   | not_null, unique, parent -> id integrity  | volume                                            |
//! | stories, post-enrich     | not_null, unique                          | score >= 0, hours_to_peak >= 0, obs >= 1, volume  |
//! | comments, post-enrich    | not_null (incl. sentiment_label), unique  | sentiment in [-1, 1], volume                      |

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::Record;
use crate::quality::{
    check_not_null, check_range, check_referential_integrity, check_unique, check_volume,
    CheckResult, Severity, DEFAULT_SAMPLE_SIZE,
};

/// A battery run ended with at least one critical failure. Raised by
/// the pipeline stages after reports are persisted, so the evidence is
/// always in the lake before the run aborts.
#[derive(Debug, Error)]
#[error(
    "quality gate failed for '{entity}' on {ingestion_date}: \
     {failed_checks} of {total_checks} critical checks failed"
)]
pub struct QualityGateError {
    pub entity: String,
    pub ingestion_date: NaiveDate,
    pub failed_checks: usize,
    pub total_checks: usize,
}

/// Aggregated report for one battery run, persisted to the lake as a
/// single-element snapshot.
#[derive(Debug, Serialize)]
pub struct QualityReport {
    pub ingestion_date: NaiveDate,
    pub generated_at: String,
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub has_critical_failures: bool,
    pub entities: BTreeMap<String, serde_json::Value>,
    pub checks: Vec<CheckResult>,
}

/// Runs the fixed batteries and folds their results into reports.
pub struct QualityRunner {
    sample_size: usize,
}

impl Default for QualityRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityRunner {
    pub fn new() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    /// Post-processing battery for stories.
    pub fn run_story_checks(&self, stories: &[Record]) -> Vec<CheckResult> {
        vec![
            check_not_null(
                stories,
                &["id", "type", "time", "ingestion_date"],
                Severity::Critical,
                self.sample_size,
            ),
            check_unique(
                stories,
                &["id", "ingestion_date"],
                Severity::Critical,
                self.sample_size,
            ),
            check_range(
                stories,
                "score",
                Some(0.0),
                None,
                Severity::Warning,
                self.sample_size,
            ),
            check_range(
                stories,
                "descendants",
                Some(0.0),
                None,
                Severity::Warning,
                self.sample_size,
            ),
            check_volume(stories, "stories", 1, Severity::Warning),
        ]
    }

    /// Post-processing battery for comments. Referential integrity
    /// validates comment parents against the union of story ids and
    /// comment ids, since a comment's parent may be another comment.
    pub fn run_comment_checks(
        &self,
        comments: &[Record],
        parent_pool: &[Record],
    ) -> Vec<CheckResult> {
        vec![
            check_not_null(
                comments,
                &["id", "type", "time", "parent", "ingestion_date"],
                Severity::Critical,
                self.sample_size,
            ),
            check_unique(
                comments,
                &["id", "ingestion_date"],
                Severity::Critical,
                self.sample_size,
            ),
            check_referential_integrity(
                comments,
                parent_pool,
                "parent",
                "id",
                Severity::Critical,
                self.sample_size,
            ),
            check_volume(comments, "comments", 1, Severity::Warning),
        ]
    }

    /// Post-enrichment battery for stories.
    pub fn run_enriched_story_checks(&self, stories: &[Record]) -> Vec<CheckResult> {
        vec![
            check_not_null(
                stories,
                &["id", "type", "time", "ingestion_date"],
                Severity::Critical,
                self.sample_size,
            ),
            check_unique(
                stories,
                &["id", "ingestion_date"],
                Severity::Critical,
                self.sample_size,
            ),
            check_range(
                stories,
                "score",
                Some(0.0),
                None,
                Severity::Warning,
                self.sample_size,
            ),
            check_range(
                stories,
                "hours_to_peak",
                Some(0.0),
                None,
                Severity::Warning,
                self.sample_size,
            ),
            check_range(
                stories,
                "observations_in_window",
                Some(1.0),
                None,
                Severity::Warning,
                self.sample_size,
            ),
            check_volume(stories, "stories", 1, Severity::Warning),
        ]
    }

    /// Post-enrichment battery for comments. `sentiment_label` is part
    /// of the critical not-null set: enrichment writes it for every
    /// row, including empty-text comments.
    pub fn run_enriched_comment_checks(&self, comments: &[Record]) -> Vec<CheckResult> {
        vec![
            check_not_null(
                comments,
                &["id", "type", "time", "parent", "ingestion_date", "sentiment_label"],
                Severity::Critical,
                self.sample_size,
            ),
            check_unique(
                comments,
                &["id", "ingestion_date"],
                Severity::Critical,
                self.sample_size,
            ),
            check_range(
                comments,
                "sentiment_score",
                Some(-1.0),
                Some(1.0),
                Severity::Warning,
                self.sample_size,
            ),
            check_volume(comments, "comments", 1, Severity::Warning),
        ]
    }

    /// Fold one entity's check results into a report.
    pub fn build_report(
        &self,
        entity: &str,
        ingestion_date: NaiveDate,
        checks: Vec<CheckResult>,
    ) -> QualityReport {
        let total = checks.len();
        let passed = checks.iter().filter(|c| c.passed).count();
        let failed = total - passed;
        let critical_failures = checks
            .iter()
            .filter(|c| !c.passed && c.severity == Severity::Critical)
            .count();

        let mut entities = BTreeMap::new();
        entities.insert(
            entity.to_string(),
            json!({
                "total_checks": total,
                "passed_checks": passed,
                "failed_checks": failed,
                "critical_failures": critical_failures,
            }),
        );

        QualityReport {
            ingestion_date,
            generated_at: Utc::now().to_rfc3339(),
            total_checks: total,
            passed_checks: passed,
            failed_checks: failed,
            has_critical_failures: critical_failures > 0,
            entities,
            checks,
        }
    }

    /// Enforce the gate for one entity's report. Returns the
    /// [`QualityGateError`] when the report carries critical failures.
    pub fn enforce_gate(
        &self,
        entity: &str,
        report: &QualityReport,
    ) -> Result<(), QualityGateError> {
        if !report.has_critical_failures {
            return Ok(());
        }
        let failed_critical = report
            .checks
            .iter()
            .filter(|c| !c.passed && c.severity == Severity::Critical)
            .count();
        let total_critical = report
            .checks
            .iter()
            .filter(|c| c.severity == Severity::Critical)
            .count();
        Err(QualityGateError {
            entity: entity.to_string(),
            ingestion_date: report.ingestion_date,
            failed_checks: failed_critical,
            total_checks: total_critical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

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
    fn test_story_battery_passes_on_clean_partition() {
        let stories = rows(vec![json!({
            "id": 1, "type": "story", "time": 1_700_000_000i64,
            "ingestion_date": "2026-02-01", "score": 42, "descendants": 7,
        })]);
        let runner = QualityRunner::new();
        let checks = runner.run_story_checks(&stories);
        assert_eq!(checks.len(), 5);
        assert!(checks.iter().all(|c| c.passed));

        let report = runner.build_report("stories", date("2026-02-01"), checks);
        assert!(!report.has_critical_failures);
        assert!(runner.enforce_gate("stories", &report).is_ok());
    }

    #[test]
    fn test_gate_trips_on_duplicate_ids() {
        let stories = rows(vec![
            json!({"id": 1, "type": "story", "time": 1, "ingestion_date": "2026-02-01"}),
            json!({"id": 1, "type": "story", "time": 1, "ingestion_date": "2026-02-01"}),
        ]);
        let runner = QualityRunner::new();
        let checks = runner.run_story_checks(&stories);
        let report = runner.build_report("stories", date("2026-02-01"), checks);
        assert!(report.has_critical_failures);

        let err = runner.enforce_gate("stories", &report).unwrap_err();
        assert_eq!(err.entity, "stories");
        assert_eq!(err.failed_checks, 1);
        assert_eq!(err.total_checks, 2);
    }

    #[test]
    fn test_warning_failures_do_not_trip_gate() {
        let stories = rows(vec![json!({
            "id": 1, "type": "story", "time": 1,
            "ingestion_date": "2026-02-01", "score": -10, "descendants": 0,
        })]);
        let runner = QualityRunner::new();
        let checks = runner.run_story_checks(&stories);
        let report = runner.build_report("stories", date("2026-02-01"), checks);
        assert!(report.failed_checks >= 1);
        assert!(!report.has_critical_failures);
        assert!(runner.enforce_gate("stories", &report).is_ok());
    }

    #[test]
    fn test_comment_battery_validates_parents_against_pool() {
        let stories = rows(vec![json!({"id": 100})]);
        let comments = rows(vec![
            json!({"id": 2, "type": "comment", "time": 1, "parent": 100,
                   "ingestion_date": "2026-02-01"}),
            json!({"id": 3, "type": "comment", "time": 1, "parent": 2,
                   "ingestion_date": "2026-02-01"}),
        ]);
        let mut pool = stories.clone();
        pool.extend(comments.iter().cloned());

        let runner = QualityRunner::new();
        let checks = runner.run_comment_checks(&comments, &pool);
        assert!(checks.iter().all(|c| c.passed));
    }

    #[test]
    fn test_enriched_comment_battery_flags_out_of_range_sentiment() {
        let comments = rows(vec![json!({
            "id": 2, "type": "comment", "time": 1, "parent": 100,
            "ingestion_date": "2026-02-01",
            "sentiment_score": 3.5, "sentiment_label": "positive",
        })]);
        let runner = QualityRunner::new();
        let checks = runner.run_enriched_comment_checks(&comments);
        let range = checks
            .iter()
            .find(|c| c.name == "check_range")
            .unwrap();
        assert!(!range.passed);
        assert_eq!(range.severity, Severity::Warning);
        // Everything else about the row is sound.
        assert!(checks.iter().filter(|c| c.name != "check_range").all(|c| c.passed));
    }
}
