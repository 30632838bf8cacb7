//! In-memory [`CacheStore`] implementation backed by [`DashMap`].
//!
//! Provides concurrent read/write access without external locking. Used when
//! no cache directory is configured and throughout the tests.

use dashmap::DashMap;

use crate::storage::store::{CacheEntry, CacheError, CacheKey, CacheStore};

/// In-memory cache store.
///
/// Readers never block each other; writers contend only on the shard that
/// owns the key. Contents are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<CacheKey, (Vec<u8>, u64)>,
}

impl MemoryCacheStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).map(|r| {
            let (payload, fetched_at) = r.value();
            CacheEntry {
                key: key.clone(),
                payload: payload.clone(),
                fetched_at: *fetched_at,
            }
        }))
    }

    fn put(&self, key: &CacheKey, payload: Vec<u8>, fetched_at: u64) -> Result<(), CacheError> {
        self.entries.insert(key.clone(), (payload, fetched_at));
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn list_keys_older_than(
        &self,
        namespace: &str,
        cutoff: u64,
    ) -> Result<Vec<CacheKey>, CacheError> {
        let mut keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|r| r.key().namespace == namespace && r.value().1 < cutoff)
            .map(|r| r.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: &str, k: &str) -> CacheKey {
        CacheKey::new(ns, k)
    }

    #[test]
    fn put_then_get_round_trip() {
        let store = MemoryCacheStore::new();
        store.put(&key("a", "1"), b"payload".to_vec(), 100).unwrap();

        let entry = store.get(&key("a", "1")).unwrap().unwrap();
        assert_eq!(entry.payload, b"payload");
        assert_eq!(entry.fetched_at, 100);
        assert!(store.get(&key("a", "2")).unwrap().is_none());
    }

    #[test]
    fn put_replaces_existing_entry() {
        let store = MemoryCacheStore::new();
        store.put(&key("a", "1"), b"old".to_vec(), 1).unwrap();
        store.put(&key("a", "1"), b"new".to_vec(), 2).unwrap();

        let entry = store.get(&key("a", "1")).unwrap().unwrap();
        assert_eq!(entry.payload, b"new");
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn delete_reports_presence() {
        let store = MemoryCacheStore::new();
        store.put(&key("a", "1"), Vec::new(), 1).unwrap();

        assert!(store.delete(&key("a", "1")).unwrap());
        assert!(!store.delete(&key("a", "1")).unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn namespaces_do_not_collide() {
        let store = MemoryCacheStore::new();
        store.put(&key("router.app", "x"), b"app".to_vec(), 1).unwrap();
        store.put(&key("router.rtm", "x"), b"rtm".to_vec(), 1).unwrap();

        assert_eq!(store.get(&key("router.app", "x")).unwrap().unwrap().payload, b"app");
        assert_eq!(store.get(&key("router.rtm", "x")).unwrap().unwrap().payload, b"rtm");
    }

    #[test]
    fn list_keys_older_than_is_strict_and_namespaced() {
        let store = MemoryCacheStore::new();
        store.put(&key("query", "old"), Vec::new(), 10).unwrap();
        store.put(&key("query", "edge"), Vec::new(), 20).unwrap();
        store.put(&key("query", "new"), Vec::new(), 30).unwrap();
        store.put(&key("file", "old"), Vec::new(), 10).unwrap();

        let keys = store.list_keys_older_than("query", 20).unwrap();
        assert_eq!(keys, vec![key("query", "old")]);
    }
}
