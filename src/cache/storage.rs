use dashmap::DashMap;

use super::CacheEntry;

/// Backend holding cache entries.
///
/// The in-memory [`MemoryStorage`] is used by default. Implement this trait to persist
/// entries elsewhere; all operations are synchronous because cache reads never perform
/// I/O on behalf of callers. Every operation must be atomic per key: a concurrent
/// [`CacheStorage::set`] is either fully before or fully after it.
pub trait CacheStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry>;

    fn set(&self, entry: CacheEntry);

    fn remove(&self, key: &str) -> Option<CacheEntry>;

    /// Marks the stored entry stale in place. Returns `false` when nothing is stored.
    fn invalidate(&self, key: &str) -> bool;

    /// Removes the stored entry only if `predicate` holds for it.
    fn remove_if(&self, key: &str, predicate: &dyn Fn(&CacheEntry) -> bool) -> Option<CacheEntry>;

    fn keys(&self) -> Vec<String>;

    fn clear(&self);
}

/// Process-local storage backed by a `DashMap`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, entry: CacheEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    fn invalidate(&self, key: &str) -> bool {
        self.entries
            .get_mut(key)
            .map(|mut entry| entry.invalidate())
            .is_some()
    }

    fn remove_if(&self, key: &str, predicate: &dyn Fn(&CacheEntry) -> bool) -> Option<CacheEntry> {
        self.entries
            .remove_if(key, |_, entry| predicate(entry))
            .map(|(_, entry)| entry)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;
    use serde_json::json;

    fn entry(value: i64) -> CacheEntry {
        CacheEntry::new("key", Response::success(200, json!(value)))
    }

    #[test]
    fn test_invalidate_in_place() {
        let storage = MemoryStorage::new();
        assert!(!storage.invalidate("key"));

        storage.set(entry(1).with_refreshed(true));
        assert!(storage.invalidate("key"));

        let stored = storage.get("key").expect("entry kept");
        assert!(stored.is_invalidated);
        assert!(!stored.is_refreshed);
        assert_eq!(stored.response.data, Some(json!(1)));
    }

    #[test]
    fn test_remove_if_checks_stored_entry() {
        let storage = MemoryStorage::new();
        storage.set(entry(1));

        assert!(storage.remove_if("key", &|entry| entry.retries > 0).is_none());
        assert!(storage.get("key").is_some());

        let removed = storage.remove_if("key", &|entry| entry.retries == 0);
        assert_eq!(removed.map(|entry| entry.response.data), Some(Some(json!(1))));
        assert!(storage.get("key").is_none());
    }
}
