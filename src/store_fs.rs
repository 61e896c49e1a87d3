//! Filesystem-backed object store.
//!
//! Maps object keys directly onto paths under a root directory. Used
//! for local development and integration tests; the layout on disk is
//! identical to the S3 key layout, so a local lake can be synced to a
//! bucket as-is.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::store::ObjectStore;

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`, creating the directory if
    /// needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create lake root: {}", root.display()))?;
        Ok(Self { root })
    }

    fn resolve(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if !self.root.exists() {
            return Ok(keys);
        }
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.with_context(|| {
                format!("Failed to walk lake root: {}", self.root.display())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .expect("walked path is under root");
            // Keys are always /-separated, regardless of platform.
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        store
            .put("raw/stories/a.jsonl", b"{}\n".to_vec(), "application/x-ndjson")
            .await
            .unwrap();

        let bytes = store.get("raw/stories/a.jsonl").await.unwrap().unwrap();
        assert_eq!(bytes, b"{}\n");
    }

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        assert!(store.get("nope/missing.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        store
            .put("raw/stories/ingestion_date=2026-02-01/s.jsonl", b"x".to_vec(), "text/plain")
            .await
            .unwrap();
        store
            .put("raw/comments/ingestion_date=2026-02-01/c.jsonl", b"x".to_vec(), "text/plain")
            .await
            .unwrap();

        let keys = store.list("raw/stories/").await.unwrap();
        assert_eq!(keys, vec!["raw/stories/ingestion_date=2026-02-01/s.jsonl"]);

        let all = store.list("").await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
