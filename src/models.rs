//! Core row model and schema constants used throughout the pipeline.
//!
//! Records flowing through the lake are generic JSON objects
//! ([`Record`]); the processor projects them onto the versioned column
//! lists below before anything downstream touches them. The coercion
//! helpers implement the lenient numeric parsing every stage and quality
//! check shares: values that cannot be read as a number coerce to `None`
//! instead of failing the row outright.

use serde_json::Value;

/// One row of a lake partition: column name → JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Story schema, version 1. Missing columns are synthesized as null,
/// unexpected ones are dropped during projection.
pub const STORY_COLUMNS_V1: &[&str] = &[
    "id",
    "type",
    "by",
    "time",
    "title",
    "url",
    "text",
    "score",
    "descendants",
    "kids",
    "dead",
    "deleted",
];

/// Comment schema, version 1.
pub const COMMENT_COLUMNS_V1: &[&str] = &[
    "id", "type", "by", "time", "text", "parent", "kids", "dead", "deleted",
];

/// Coerce a JSON value to `f64`.
///
/// Numbers pass through, numeric strings are parsed, booleans map to
/// 0/1. Everything else (null, arrays, objects, non-numeric strings)
/// coerces to `None`.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Coerce a JSON value to an integer.
///
/// Accepts integral floats (`5.0` → `5`) but rejects fractional ones,
/// matching the strict integer typing of primary-key columns.
pub fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| match s.parse::<f64>() {
                Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
                _ => None,
            })
        }
        Value::Bool(b) => Some(if *b { 1 } else { 0 }),
        _ => None,
    }
}

/// Read a record field, treating a missing key as null.
pub fn field<'a>(record: &'a Record, column: &str) -> &'a Value {
    record.get(column).unwrap_or(&Value::Null)
}

/// True if the field is absent or JSON null.
pub fn is_null(record: &Record, column: &str) -> bool {
    matches!(record.get(column), None | Some(Value::Null))
}

/// Read a record field as an integer via lenient coercion.
pub fn field_i64(record: &Record, column: &str) -> Option<i64> {
    coerce_i64(field(record, column))
}

/// Read a record field as a string slice, if it is one.
pub fn field_str<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
    field(record, column).as_str()
}
