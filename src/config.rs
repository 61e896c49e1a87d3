//! TOML configuration loading and validation.
//!
//! All knobs live in one file (default `./config/hnlake.toml`) with
//! serde defaults, so a minimal config is valid:
//!
//! ```toml
//! [lake]
//! backend = "fs"
//! root = "./lake"
//! ```
//!
//! An S3-backed lake instead sets:
//!
//! ```toml
//! [lake]
//! backend = "s3"
//! bucket = "hn-lake"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub lake: LakeConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub transform: TransformConfig,
}

/// Where the lake lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LakeConfig {
    /// `"fs"` or `"s3"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Root directory for the fs backend.
    #[serde(default = "default_root")]
    pub root: String,
    /// Bucket name, required for the s3 backend.
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

/// Hacker News API behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum gap between consecutive API requests.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Cap on new top stories fetched per run.
    #[serde(default = "default_max_stories")]
    pub max_stories: usize,
    /// Comment tree depth cutoff.
    #[serde(default = "default_max_comment_depth")]
    pub max_comment_depth: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingConfig {
    /// Days a story stays in the re-fetch window.
    #[serde(default = "default_tracking_days")]
    pub tracking_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    /// Days of history pulled into the enrichment window.
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Topics extracted per story title.
    #[serde(default = "default_top_n_topics")]
    pub top_n_topics: usize,
}

fn default_backend() -> String {
    "fs".to_string()
}
fn default_root() -> String {
    "./lake".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_base_url() -> String {
    crate::hn_client::DEFAULT_BASE_URL.to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_max_stories() -> usize {
    100
}
fn default_max_comment_depth() -> u32 {
    10
}
fn default_tracking_days() -> i64 {
    7
}
fn default_window_days() -> i64 {
    7
}
fn default_top_n_topics() -> usize {
    3
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: default_root(),
            bucket: None,
            region: default_region(),
            endpoint_url: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            max_stories: default_max_stories(),
            max_comment_depth: default_max_comment_depth(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_days: default_tracking_days(),
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            top_n_topics: default_top_n_topics(),
        }
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.lake.backend.as_str() {
        "fs" => {
            if config.lake.root.is_empty() {
                bail!("lake.root must not be empty for the fs backend");
            }
        }
        "s3" => {
            if config.lake.bucket.as_deref().unwrap_or("").is_empty() {
                bail!("lake.bucket is required for the s3 backend");
            }
        }
        other => bail!("unknown lake backend '{}' (expected 'fs' or 's3')", other),
    }

    if config.api.max_stories == 0 {
        bail!("api.max_stories must be at least 1");
    }
    if config.api.max_comment_depth == 0 {
        bail!("api.max_comment_depth must be at least 1");
    }
    if config.tracking.tracking_days < 1 {
        bail!("tracking.tracking_days must be at least 1");
    }
    if config.transform.window_days < 1 {
        bail!("transform.window_days must be at least 1");
    }
    if config.transform.top_n_topics == 0 {
        bail!("transform.top_n_topics must be at least 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[lake]\nbackend = \"fs\"\n").unwrap();
        assert_eq!(config.lake.root, "./lake");
        assert_eq!(config.api.request_delay_ms, 1000);
        assert_eq!(config.api.max_comment_depth, 10);
        assert_eq!(config.tracking.tracking_days, 7);
        assert_eq!(config.transform.window_days, 7);
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config = parse("").unwrap();
        assert_eq!(config.lake.backend, "fs");
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        let err = parse("[lake]\nbackend = \"s3\"\n").unwrap_err();
        assert!(err.to_string().contains("lake.bucket"));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let err = parse("[lake]\nbackend = \"gcs\"\n").unwrap_err();
        assert!(err.to_string().contains("unknown lake backend"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(parse("[lake]\nbakend = \"fs\"\n").is_err());
    }

    #[test]
    fn test_zero_window_days_is_rejected() {
        let err = parse("[transform]\nwindow_days = 0\n").unwrap_err();
        assert!(err.to_string().contains("window_days"));
    }
}
