//! In-process fallback store.

use crate::{FallbackStore, StoreError};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;

/// In-process store, mostly for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: RwLock<Option<Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `payload`.
    pub fn with_record(payload: Value) -> Self {
        Self {
            record: RwLock::new(Some(payload)),
        }
    }
}

impl FallbackStore for MemoryStore {
    fn try_save<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            *self.record.write().await = Some(payload.clone());
            Ok(())
        })
    }

    fn try_load(&self) -> BoxFuture<'_, Result<Value, StoreError>> {
        Box::pin(async move { self.record.read().await.clone().ok_or(StoreError::Missing) })
    }
}
