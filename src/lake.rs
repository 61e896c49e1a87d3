//! Lake layout, partition loading, and partition writing.
//!
//! The lake is organized into three layers with date-partitioned keys:
//!
//! ```text
//! {layer}/{entity}/ingestion_date={YYYY-MM-DD}/{entity}_{YYYYMMDD_HHMMSS}.{ext}
//! ```
//!
//! | Layer | Contents | Format |
//! |-----------|----------------------------------|----------|
//! | raw | API responses as fetched | JSONL |
//! | processed | normalized, validated records | snapshot |
//! | output | enriched, analysis-ready records | snapshot |
//!
//! Snapshots are single JSON arrays of records. A partition may hold
//! several files from repeated runs; loaders concatenate them all, and
//! downstream deduplication keeps the last occurrence.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::models::Record;
use crate::quality_runner::QualityReport;
use crate::store::ObjectStore;

// ============ Layout ============

/// The three lake layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Raw,
    Processed,
    Output,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Processed => "processed",
            Layer::Output => "output",
        }
    }
}

/// File format within a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LakeFormat {
    /// One JSON object per line. Used for the raw layer.
    Jsonl,
    /// A single JSON array of records. Used for processed and output.
    Snapshot,
}

impl LakeFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            LakeFormat::Jsonl => "jsonl",
            LakeFormat::Snapshot => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            LakeFormat::Jsonl => "application/x-ndjson",
            LakeFormat::Snapshot => "application/json",
        }
    }
}

/// Key prefix for one entity partition.
pub fn partition_prefix(layer: Layer, entity: &str, date: NaiveDate) -> String {
    format!("{}/{}/ingestion_date={}/", layer.as_str(), entity, date)
}

// ============ Loading ============

/// Reads entity partitions out of the lake.
pub struct LakeLoader {
    store: Arc<dyn ObjectStore>,
}

impl LakeLoader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Load every record in one entity partition.
    ///
    /// Concatenates all matching files. Files that fail to parse are
    /// skipped with a warning rather than failing the load: one
    /// corrupt file must not take out the whole partition. A missing
    /// partition is an empty result, not an error.
    pub async fn load_partition(
        &self,
        layer: Layer,
        entity: &str,
        date: NaiveDate,
        format: LakeFormat,
    ) -> Result<Vec<Record>> {
        let prefix = partition_prefix(layer, entity, date);
        let suffix = format!(".{}", format.extension());

        let keys = self.store.list(&prefix).await?;
        let mut records = Vec::new();

        for key in keys.iter().filter(|k| k.ends_with(&suffix)) {
            let Some(bytes) = self.store.get(key).await? else {
                // Listed but gone by the time we read it.
                warn!(key = %key, "object disappeared between list and get");
                continue;
            };
            match parse_file(&bytes, format) {
                Ok(batch) => records.extend(batch),
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping unparseable lake file");
                }
            }
        }

        Ok(records)
    }
}

fn parse_file(bytes: &[u8], format: LakeFormat) -> Result<Vec<Record>> {
    let text = std::str::from_utf8(bytes).context("file is not valid UTF-8")?;
    match format {
        LakeFormat::Jsonl => text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| serde_json::from_str::<Record>(line).context("invalid JSONL line"))
            .collect(),
        LakeFormat::Snapshot => {
            serde_json::from_str::<Vec<Record>>(text).context("invalid snapshot array")
        }
    }
}

// ============ Writing ============

/// Writes entity partitions into the lake.
pub struct LakeWriter {
    store: Arc<dyn ObjectStore>,
}

impl LakeWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Save a batch of records as a new timestamped file in the
    /// entity's partition. Returns the key written.
    ///
    /// Empty batches are rejected: an empty partition file would be
    /// indistinguishable from a partial write.
    pub async fn save(
        &self,
        layer: Layer,
        entity: &str,
        date: NaiveDate,
        format: LakeFormat,
        records: &[Record],
    ) -> Result<String> {
        if records.is_empty() {
            bail!(
                "refusing to write empty batch for {}/{} on {}",
                layer.as_str(),
                entity,
                date
            );
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let key = format!(
            "{}{}_{}.{}",
            partition_prefix(layer, entity, date),
            entity,
            timestamp,
            format.extension()
        );

        let body = serialize_file(records, format)?;
        self.store
            .put(&key, body, format.content_type())
            .await
            .with_context(|| format!("Failed to write lake file '{}'", key))?;

        Ok(key)
    }

    /// Persist a quality report under its own entity so failed-run
    /// evidence lands in the lake even when the gate aborts the run.
    pub async fn save_quality_report(
        &self,
        layer: Layer,
        entity: &str,
        date: NaiveDate,
        report: &QualityReport,
    ) -> Result<String> {
        let report_entity = format!("quality_reports_{}", entity);
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let key = format!(
            "{}{}_{}.json",
            partition_prefix(layer, &report_entity, date),
            report_entity,
            timestamp
        );

        let body = serialize_value(&[report])?;
        self.store
            .put(&key, body, LakeFormat::Snapshot.content_type())
            .await
            .with_context(|| format!("Failed to write quality report '{}'", key))?;

        Ok(key)
    }
}

fn serialize_file(records: &[Record], format: LakeFormat) -> Result<Vec<u8>> {
    match format {
        LakeFormat::Jsonl => {
            let mut out = Vec::new();
            for record in records {
                serde_json::to_writer(&mut out, record)?;
                out.push(b'\n');
            }
            Ok(out)
        }
        LakeFormat::Snapshot => Ok(serde_json::to_vec_pretty(records)?),
    }
}

fn serialize_value<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}
