//! JSON file backed store.

use crate::{FallbackStore, StoreError};
use futures::future::BoxFuture;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Keeps the record as a single JSON document on disk.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// record, so readers see either the old or the new payload in full.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store persisting to `path`.
    ///
    /// Nothing is touched on disk until the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}.tmp", std::process::id(), seq));
        self.path.with_file_name(name)
    }
}

impl FallbackStore for FileStore {
    fn try_save<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let bytes = serde_json::to_vec(payload)?;
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }

            let temp = self.temp_path();
            tokio::fs::write(&temp, &bytes).await?;
            if let Err(err) = tokio::fs::rename(&temp, &self.path).await {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(err.into());
            }
            Ok(())
        })
    }

    fn try_load(&self) -> BoxFuture<'_, Result<Value, StoreError>> {
        Box::pin(async move {
            let bytes = match tokio::fs::read(&self.path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::NotFound => return Err(StoreError::Missing),
                Err(err) => return Err(err.into()),
            };
            Ok(serde_json::from_slice(&bytes)?)
        })
    }
}
