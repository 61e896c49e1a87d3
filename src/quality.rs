//! Reusable data-quality checks for lake partitions.
//!
//! Each check is a pure function over a slice of [`Record`]s that
//! returns a structured [`CheckResult`] and never fails: the decision
//! of whether a failed check halts the pipeline belongs to the runner
//! (see [`crate::quality_runner`]), not to the check itself.
//!
//! Failed checks carry a bounded `sample_ids` list (default 10) taken
//! from the `id` column of the first affected rows, enough to diagnose
//! a failure without dumping the whole failing set.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::models::{coerce_f64, coerce_i64, field, is_null, Record};

/// Default bound on `sample_ids`.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Check severity. Critical failures block the pipeline, warnings are
/// informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Structured outcome of one quality check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
    pub description: String,
    pub affected_records: usize,
    pub details: Value,
    pub sample_ids: Vec<i64>,
}

impl CheckResult {
    fn passed(name: &str, severity: Severity, description: String, details: Value) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            severity,
            description,
            affected_records: 0,
            details,
            sample_ids: Vec::new(),
        }
    }

    fn failed(
        name: &str,
        severity: Severity,
        description: String,
        affected: usize,
        details: Value,
        sample_ids: Vec<i64>,
    ) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            severity,
            description,
            affected_records: affected,
            details,
            sample_ids,
        }
    }
}

/// Sample of `id` values for the first affected rows, bounded by
/// `sample_size`. Rows whose id does not coerce to an integer are
/// skipped.
fn sample_ids(rows: &[Record], mask: &[bool], sample_size: usize) -> Vec<i64> {
    rows.iter()
        .zip(mask)
        .filter(|(_, &affected)| affected)
        .filter_map(|(row, _)| coerce_i64(field(row, "id")))
        .take(sample_size)
        .collect()
}

/// A column is considered absent when no row in a non-empty dataset
/// carries the key. (Records are projected onto a fixed schema before
/// checks run, so all rows agree on their columns.)
fn column_absent(rows: &[Record], column: &str) -> bool {
    !rows.iter().any(|row| row.contains_key(column))
}

/// Fail if any listed column is absent or contains nulls.
///
/// An absent column counts as a 100% failure.
pub fn check_not_null(
    rows: &[Record],
    columns: &[&str],
    severity: Severity,
    sample_size: usize,
) -> CheckResult {
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| column_absent(rows, c))
        .collect();

    if !missing.is_empty() {
        return CheckResult::failed(
            "check_not_null",
            severity,
            format!("required columns absent: {missing:?}"),
            rows.len(),
            json!({ "missing_columns": missing, "columns_checked": columns }),
            Vec::new(),
        );
    }

    let mask: Vec<bool> = rows
        .iter()
        .map(|row| columns.iter().any(|c| is_null(row, c)))
        .collect();
    let affected = mask.iter().filter(|&&m| m).count();

    if affected == 0 {
        return CheckResult::passed(
            "check_not_null",
            severity,
            format!("no nulls in required columns: {columns:?}"),
            json!({ "columns_checked": columns }),
        );
    }

    CheckResult::failed(
        "check_not_null",
        severity,
        format!("nulls detected in required columns: {columns:?}"),
        affected,
        json!({ "columns_checked": columns }),
        sample_ids(rows, &mask, sample_size),
    )
}

/// Fail if any combination of the listed columns repeats.
///
/// Every row participating in a duplicate group counts as affected,
/// not just the extra occurrences.
pub fn check_unique(
    rows: &[Record],
    columns: &[&str],
    severity: Severity,
    sample_size: usize,
) -> CheckResult {
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| column_absent(rows, c))
        .collect();

    if !missing.is_empty() {
        return CheckResult::failed(
            "check_unique",
            severity,
            format!("uniqueness columns absent: {missing:?}"),
            rows.len(),
            json!({ "missing_columns": missing, "columns_checked": columns }),
            Vec::new(),
        );
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    let keys: Vec<String> = rows.iter().map(|row| composite_key(row, columns)).collect();
    for key in &keys {
        *counts.entry(key.clone()).or_insert(0) += 1;
    }

    let mask: Vec<bool> = keys.iter().map(|k| counts[k] > 1).collect();
    let affected = mask.iter().filter(|&&m| m).count();

    if affected == 0 {
        return CheckResult::passed(
            "check_unique",
            severity,
            format!("uniqueness holds for columns: {columns:?}"),
            json!({ "columns_checked": columns }),
        );
    }

    CheckResult::failed(
        "check_unique",
        severity,
        format!("duplicates detected for columns: {columns:?}"),
        affected,
        json!({ "columns_checked": columns }),
        sample_ids(rows, &mask, sample_size),
    )
}

fn composite_key(row: &Record, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| field(row, c).to_string())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// Fail if any row's column value, coerced to a number, falls outside
/// `[min, max]` (either bound optional).
///
/// Values that do not coerce to a number are excluded from the mask:
/// they never fail the range check. The not-null checks remain the
/// structural guard for such columns.
pub fn check_range(
    rows: &[Record],
    column: &str,
    min_value: Option<f64>,
    max_value: Option<f64>,
    severity: Severity,
    sample_size: usize,
) -> CheckResult {
    let details = json!({ "column": column, "min_value": min_value, "max_value": max_value });

    if column_absent(rows, column) && !rows.is_empty() {
        return CheckResult::failed(
            "check_range",
            severity,
            format!("column absent for range validation: '{column}'"),
            rows.len(),
            details,
            Vec::new(),
        );
    }

    let mask: Vec<bool> = rows
        .iter()
        .map(|row| match coerce_f64(field(row, column)) {
            Some(v) => {
                min_value.is_some_and(|min| v < min) || max_value.is_some_and(|max| v > max)
            }
            None => false,
        })
        .collect();
    let affected = mask.iter().filter(|&&m| m).count();

    if affected == 0 {
        return CheckResult::passed(
            "check_range",
            severity,
            format!("range valid for column '{column}'"),
            details,
        );
    }

    CheckResult::failed(
        "check_range",
        severity,
        format!("values out of range in '{column}'"),
        affected,
        details,
        sample_ids(rows, &mask, sample_size),
    )
}

/// Fail if any child-side key value does not resolve to a parent-side
/// key value.
///
/// Child values that do not coerce to an integer match nothing and are
/// counted as orphaned.
pub fn check_referential_integrity(
    child_rows: &[Record],
    parent_rows: &[Record],
    child_key: &str,
    parent_key: &str,
    severity: Severity,
    sample_size: usize,
) -> CheckResult {
    if column_absent(child_rows, child_key) && !child_rows.is_empty() {
        return CheckResult::failed(
            "check_referential_integrity",
            severity,
            format!("child key absent: '{child_key}'"),
            child_rows.len(),
            json!({ "child_key": child_key, "parent_key": parent_key }),
            Vec::new(),
        );
    }

    if column_absent(parent_rows, parent_key) && !parent_rows.is_empty() {
        return CheckResult::failed(
            "check_referential_integrity",
            severity,
            format!("parent key absent: '{parent_key}'"),
            child_rows.len(),
            json!({ "child_key": child_key, "parent_key": parent_key }),
            Vec::new(),
        );
    }

    let valid_parents: HashSet<i64> = parent_rows
        .iter()
        .filter_map(|row| coerce_i64(field(row, parent_key)))
        .collect();

    let mask: Vec<bool> = child_rows
        .iter()
        .map(|row| match coerce_i64(field(row, child_key)) {
            Some(v) => !valid_parents.contains(&v),
            None => true,
        })
        .collect();
    let affected = mask.iter().filter(|&&m| m).count();

    let details = json!({
        "child_key": child_key,
        "parent_key": parent_key,
        "valid_parent_count": valid_parents.len(),
    });

    if affected == 0 {
        return CheckResult::passed(
            "check_referential_integrity",
            severity,
            format!("referential integrity holds: '{child_key}' -> '{parent_key}'"),
            details,
        );
    }

    CheckResult::failed(
        "check_referential_integrity",
        severity,
        format!("invalid references from '{child_key}' to '{parent_key}'"),
        affected,
        details,
        sample_ids(child_rows, &mask, sample_size),
    )
}

/// Fail if the row count falls below the expected minimum. The
/// affected count is the shortfall.
pub fn check_volume(
    rows: &[Record],
    entity: &str,
    min_expected: usize,
    severity: Severity,
) -> CheckResult {
    let actual = rows.len();
    let details = json!({
        "entity": entity,
        "actual_count": actual,
        "min_expected": min_expected,
    });

    if actual >= min_expected {
        CheckResult::passed(
            "check_volume",
            severity,
            format!("volume valid for '{entity}': {actual} >= {min_expected}"),
            details,
        )
    } else {
        CheckResult::failed(
            "check_volume",
            severity,
            format!("insufficient volume for '{entity}': {actual} < {min_expected}"),
            min_expected - actual,
            details,
            Vec::new(),
        )
    }
}
