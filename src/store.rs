//! Object storage abstraction for the lake.
//!
//! The lake only needs three primitives: list keys under a prefix,
//! fetch an object, and write an object. [`ObjectStore`] captures that
//! surface so pipeline stages never know which backend they run on.
//!
//! Two backends are provided:
//!
//! | Backend | Module | Use case |
//! |---------|--------|----------|
//! | `fs` | [`crate::store_fs`] | Local development, integration tests |
//! | `s3` | [`crate::store_s3`] | Production lake (also MinIO/LocalStack) |

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LakeConfig;
use crate::store_fs::FsStore;
use crate::store_s3::S3Store;

/// Minimal object-store surface the lake is built on.
///
/// Keys are `/`-separated paths relative to the lake root, never
/// starting with `/`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all keys starting with `prefix`, in unspecified order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Fetch an object's bytes. A missing key is `Ok(None)`, not an
    /// error: callers routinely probe for partitions that do not
    /// exist yet.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write an object, overwriting any existing value.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

/// Instantiate the backend named in the config.
pub fn create_store(config: &LakeConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend.as_str() {
        "fs" => Ok(Arc::new(FsStore::new(&config.root)?)),
        "s3" => Ok(Arc::new(S3Store::new(config)?)),
        other => bail!("unknown lake backend '{}' (expected 'fs' or 's3')", other),
    }
}
