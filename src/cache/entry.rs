use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::response::Response;

/// The last known response for a cache key.
///
/// Entries are always replaced as a whole, never partially updated.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub response: Response,
    pub retries: u32,
    pub timestamp: DateTime<Utc>,
    /// Set when the entry replaced an earlier response for the same key.
    /// Cleared by [`Cache::revalidate`](super::Cache::revalidate).
    pub is_refreshed: bool,
    /// Set by [`Cache::revalidate`](super::Cache::revalidate); the entry is stale
    /// regardless of its age.
    pub is_invalidated: bool,
    /// How long the entry is retained. `None` keeps it until removed.
    pub cache_time: Option<Duration>,
}

impl CacheEntry {
    /// Creates a new entry timestamped now.
    pub fn new(key: impl Into<String>, response: Response) -> Self {
        Self {
            key: key.into(),
            response,
            retries: 0,
            timestamp: Utc::now(),
            is_refreshed: false,
            is_invalidated: false,
            cache_time: None,
        }
    }

    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub const fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = Some(cache_time);
        self
    }

    #[must_use]
    pub const fn with_refreshed(mut self, is_refreshed: bool) -> Self {
        self.is_refreshed = is_refreshed;
        self
    }

    /// Time elapsed since the entry was written.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.timestamp).to_std().unwrap_or_default()
    }

    /// Checks if this entry is stale based on the given stale time.
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.is_invalidated || self.age() > stale_time
    }

    /// Checks if this entry outlived its cache time and should be dropped.
    pub fn is_expired(&self) -> bool {
        self.cache_time
            .is_some_and(|cache_time| self.age() > cache_time)
    }

    /// Marks the entry stale without touching its response.
    pub const fn invalidate(&mut self) {
        self.is_refreshed = false;
        self.is_invalidated = true;
    }
}
