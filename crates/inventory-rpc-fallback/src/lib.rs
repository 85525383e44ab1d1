//! Single-slot last-known-good store.
//!
//! The store holds exactly one payload: the most recent successful upstream
//! answer. Workers overwrite it on every success; the router and the retry
//! executor read it when no live answer can be produced in time.
//!
//! # Contract
//!
//! - [`FallbackStore::save`] is best effort. A failure is reported through
//!   tracing and otherwise ignored, so it never aborts the reply in progress.
//! - [`FallbackStore::load`] never fails. When nothing was saved yet, or the
//!   record cannot be read, it returns the [`sentinel`] payload
//!   `{"error": "timeout"}`.
//! - Concurrent writers follow last-write-wins.
//!
//! ```rust
//! use inventory_rpc_fallback::{FallbackStore, MemoryStore};
//! use serde_json::json;
//!
//! # async fn example() {
//! let store = MemoryStore::new();
//! assert_eq!(store.load().await, json!({"error": "timeout"}));
//!
//! store.save(&json!({"items": 5})).await;
//! assert_eq!(store.load().await, json!({"items": 5}));
//! # }
//! ```

mod error;
mod file;
mod memory;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::warn;

/// Payload served when no last-known-good record is available.
pub fn sentinel() -> Value {
    json!({"error": "timeout"})
}

/// Persistence of the single fallback record.
pub trait FallbackStore: Send + Sync {
    /// Overwrites the record with `payload`.
    fn try_save<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Reads the record.
    fn try_load(&self) -> BoxFuture<'_, Result<Value, StoreError>>;

    /// Overwrites the record, swallowing failures.
    fn save<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(_err) = self.try_save(payload).await {
                #[cfg(feature = "tracing")]
                warn!(error = %_err, "Failed to persist fallback record");
            }
        })
    }

    /// Reads the record, substituting the [`sentinel`] on any failure.
    fn load(&self) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            match self.try_load().await {
                Ok(value) => value,
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    {
                        if !_err.is_missing() {
                            warn!(error = %_err, "Fallback record unreadable, serving sentinel");
                        }
                    }
                    sentinel()
                }
            }
        })
    }
}

impl<S: FallbackStore + ?Sized> FallbackStore for Arc<S> {
    fn try_save<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).try_save(payload)
    }

    fn try_load(&self) -> BoxFuture<'_, Result<Value, StoreError>> {
        (**self).try_load()
    }
}
