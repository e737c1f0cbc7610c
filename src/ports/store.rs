//! Whole-document persistence. The core never patches state in place: a
//! document is read as a consistent snapshot, rebuilt, and swapped
//! atomically (tmp file + rename), so a concurrent scan and monitor cycle
//! can share the store without tearing each other's reads.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// Idempotent read/write-by-key; no relational schema assumed.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn read_document(&self, key: &str) -> Result<Option<String>>;
    async fn write_document(&self, key: &str, payload: &str) -> Result<()>;
}

/// Read a JSON document into a typed value; `None` when absent.
pub async fn read_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.read_document(key).await? {
        Some(payload) => {
            let value = serde_json::from_str(&payload)
                .with_context(|| format!("failed to decode document '{}'", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and swap in a typed document.
pub async fn write_json<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let payload = serde_json::to_string(value)
        .with_context(|| format!("failed to encode document '{}'", key))?;
    store.write_document(key, &payload).await
}

/// One JSON file per key under a base directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", sanitized))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn read_document(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(payload) => Ok(Some(payload)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    async fn write_document(&self, key: &str, payload: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, payload)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to finalize {}", path.display()))?;
        Ok(())
    }
}
