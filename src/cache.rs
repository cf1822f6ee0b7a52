//! Response cache shared by every observer of a client.
//!
//! The cache stores the last settled [`Response`](crate::response::Response) per cache
//! key and broadcasts every write to the listeners of that key, so all observers
//! watching the same resource converge on the same data, error and status.
//!
//! The cache never performs I/O. [`Cache::revalidate`] only marks an entry stale and
//! signals the observers of the key, which re-dispatch their own requests.
//!
//! # Example
//!
//! ```
//! use hyperflow::cache::{Cache, CacheEntry};
//! use hyperflow::response::Response;
//! use serde_json::json;
//!
//! let cache = Cache::new();
//! let _handle = cache.subscribe("users", |entry| {
//!     println!("users changed: {:?}", entry.response.data);
//! });
//!
//! cache.set(CacheEntry::new("users", Response::success(200, json!([]))));
//! assert!(cache.get("users").is_some());
//! ```

mod entry;
mod storage;

use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use tracing::debug;

use crate::events::{Emitter, EventHandle};

pub use entry::CacheEntry;
pub use storage::{CacheStorage, MemoryStorage};

/// Keyed response cache with per-key change notifications.
#[derive(Clone)]
pub struct Cache {
    storage: Arc<dyn CacheStorage>,
    changes: Emitter<CacheEntry>,
    revalidations: Emitter<String>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("keys", &self.storage.keys().len())
            .finish()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Creates a cache backed by [`MemoryStorage`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    #[must_use]
    pub fn with_storage(storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            storage,
            changes: Emitter::new(),
            revalidations: Emitter::new(),
        }
    }

    /// Stores `entry` under its key and notifies the key's listeners in registration order.
    pub fn set(&self, entry: CacheEntry) {
        debug!(
            cache_key = %entry.key,
            status = entry.response.status,
            retries = entry.retries,
            "cache set"
        );
        self.storage.set(entry.clone());
        self.changes.emit(&entry.key, &entry);
    }

    /// Returns the entry for `key`.
    ///
    /// Entries past their cache time are dropped and reported as missing.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.storage.get(key)?;
        if !entry.is_expired() {
            return Some(entry);
        }
        debug!(cache_key = key, "cache entry expired");
        // A fresh entry may have been written since the read; only the expired one goes.
        self.storage.remove_if(key, &|entry: &CacheEntry| entry.is_expired());
        self.storage.get(key).filter(|entry| !entry.is_expired())
    }

    /// Marks the entry stale and asks every observer of `key` to refetch.
    ///
    /// Observers are notified even when nothing is cached under `key`.
    pub fn revalidate(&self, key: &str) {
        self.storage.invalidate(key);
        debug!(cache_key = key, "cache revalidate");
        self.revalidations.emit(key, &key.to_string());
    }

    /// Registers `callback` for every [`Cache::set`] on `key`.
    pub fn subscribe<F>(&self, key: impl Into<String>, callback: F) -> EventHandle
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        self.changes.on(key, callback)
    }

    /// Streams every entry written under `key` from now on.
    pub fn watch(&self, key: impl Into<String>) -> BoxStream<'static, CacheEntry> {
        self.changes.stream(key)
    }

    /// Registers `callback` for every [`Cache::revalidate`] of `key`.
    pub fn on_revalidate<F>(&self, key: impl Into<String>, callback: F) -> EventHandle
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.revalidations.on(key, callback)
    }

    /// Removes a single entry without notifying anyone.
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.storage.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.storage.keys()
    }

    /// Drops every entry. Listeners are not notified.
    pub fn clear(&self) {
        debug!("cache clear");
        self.storage.clear();
    }
}
