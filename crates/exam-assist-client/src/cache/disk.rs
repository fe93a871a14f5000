use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use time::OffsetDateTime;
use tokio::{fs, task};
use tracing::debug;

use crate::types::CacheEntry;

/// JSON files under a single directory, each wrapped in a timestamped [`CacheEntry`].
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub async fn load<T>(&self, file_name: &str) -> Result<Option<CacheEntry<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = self.path_for(file_name);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }

        let data = fs::read(&path)
            .await
            .with_context(|| format!("failed to read cache file {path:?}"))?;
        let entry = task::spawn_blocking(move || serde_json::from_slice::<CacheEntry<T>>(&data))
            .await?
            .with_context(|| format!("failed to deserialize cache file {path:?}"))?;

        debug!(target: "exam_assist_cache", file = ?path, stored_at = %entry.stored_at, "loaded cache entry");
        Ok(Some(entry))
    }

    pub async fn store<T>(&self, file_name: &str, value: T) -> Result<()>
    where
        T: Serialize + Send + 'static,
    {
        let path = self.path_for(file_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create cache dir {parent:?}"))?;
        }

        let entry = CacheEntry {
            value,
            stored_at: OffsetDateTime::now_utc(),
        };

        let payload = task::spawn_blocking(move || serde_json::to_vec(&entry)).await??;
        fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write cache file {path:?}"))?;

        debug!(target: "exam_assist_cache", file = ?path, "wrote cache entry");
        Ok(())
    }
}
