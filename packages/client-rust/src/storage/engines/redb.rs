//! Persistent [`CacheStore`] backed by a single `redb` database file.
//!
//! All namespaces share one table. Rows are keyed `"{namespace}/{key}"` so a
//! namespace is a contiguous key range, and each value is a `MsgPack`
//! envelope carrying the payload and its fetch time.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::storage::store::{CacheEntry, CacheError, CacheKey, CacheStore};

/// File name of the database inside the router cache directory.
pub const DB_FILE_NAME: &str = "router.redb";

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("cache_entries");

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    payload: Vec<u8>,
    fetched_at: u64,
}

fn row_key(key: &CacheKey) -> String {
    format!("{}/{}", key.namespace, key.key)
}

fn split_row_key(row: &str) -> Option<CacheKey> {
    row.split_once('/').map(|(ns, k)| CacheKey::new(ns, k))
}

/// Durable cache store living in `{cache_dir}/router.redb`.
///
/// Every write commits its own transaction, so an entry reported as stored
/// survives a crash. `redb` serializes writers internally; readers run on
/// snapshots and never block writers.
pub struct RedbCacheStore {
    db: Database,
    path: PathBuf,
}

impl RedbCacheStore {
    /// Opens (creating if needed) the store inside `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the directory cannot be created
    /// or the database cannot be opened.
    pub fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(CacheError::unavailable)?;
        let path = cache_dir.join(DB_FILE_NAME);
        let db = Database::create(&path).map_err(CacheError::unavailable)?;

        // Create the table up front so read transactions never see it missing.
        let txn = db.begin_write().map_err(CacheError::unavailable)?;
        txn.open_table(ENTRIES).map_err(CacheError::unavailable)?;
        txn.commit().map_err(CacheError::unavailable)?;

        tracing::debug!(path = %path.display(), "Opened router cache database");
        Ok(Self { db, path })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RedbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbCacheStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CacheStore for RedbCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let txn = self.db.begin_read().map_err(CacheError::unavailable)?;
        let table = txn.open_table(ENTRIES).map_err(CacheError::unavailable)?;
        let Some(guard) = table
            .get(row_key(key).as_str())
            .map_err(CacheError::unavailable)?
        else {
            return Ok(None);
        };

        let stored: StoredEntry =
            rmp_serde::from_slice(guard.value()).map_err(|e| CacheError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(CacheEntry {
            key: key.clone(),
            payload: stored.payload,
            fetched_at: stored.fetched_at,
        }))
    }

    fn put(&self, key: &CacheKey, payload: Vec<u8>, fetched_at: u64) -> Result<(), CacheError> {
        let bytes = rmp_serde::to_vec(&StoredEntry { payload, fetched_at })
            .map_err(CacheError::unavailable)?;
        let row = row_key(key);

        let txn = self.db.begin_write().map_err(CacheError::unavailable)?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(CacheError::unavailable)?;
            table
                .insert(row.as_str(), bytes.as_slice())
                .map_err(CacheError::unavailable)?;
        }
        txn.commit().map_err(CacheError::unavailable)
    }

    fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let row = row_key(key);
        let txn = self.db.begin_write().map_err(CacheError::unavailable)?;
        let existed = {
            let mut table = txn.open_table(ENTRIES).map_err(CacheError::unavailable)?;
            let removed = table.remove(row.as_str()).map_err(CacheError::unavailable)?;
            removed.is_some()
        };
        txn.commit().map_err(CacheError::unavailable)?;
        Ok(existed)
    }

    fn list_keys_older_than(
        &self,
        namespace: &str,
        cutoff: u64,
    ) -> Result<Vec<CacheKey>, CacheError> {
        // '0' sorts directly after '/', so this range covers "{namespace}/*".
        let lo = format!("{namespace}/");
        let hi = format!("{namespace}0");

        let txn = self.db.begin_read().map_err(CacheError::unavailable)?;
        let table = txn.open_table(ENTRIES).map_err(CacheError::unavailable)?;
        let mut keys = Vec::new();
        for row in table
            .range(lo.as_str()..hi.as_str())
            .map_err(CacheError::unavailable)?
        {
            let (k, v) = row.map_err(CacheError::unavailable)?;
            // Undecodable rows are unrecoverable garbage; report them as expired.
            let expired = rmp_serde::from_slice::<StoredEntry>(v.value())
                .map_or(true, |stored| stored.fetched_at < cutoff);
            if expired {
                if let Some(key) = split_row_key(k.value()) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn len(&self) -> Result<usize, CacheError> {
        let txn = self.db.begin_read().map_err(CacheError::unavailable)?;
        let table = txn.open_table(ENTRIES).map_err(CacheError::unavailable)?;
        let len = table.len().map_err(CacheError::unavailable)?;
        usize::try_from(len).map_err(CacheError::unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: &str, k: &str) -> CacheKey {
        CacheKey::new(ns, k)
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbCacheStore::open(&dir.path().join("nested/router")).unwrap();
        assert!(store.path().exists());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbCacheStore::open(dir.path()).unwrap();

        store.put(&key("router.app", "abc"), b"doc".to_vec(), 1_234).unwrap();
        let entry = store.get(&key("router.app", "abc")).unwrap().unwrap();
        assert_eq!(entry.payload, b"doc");
        assert_eq!(entry.fetched_at, 1_234);

        assert!(store.delete(&key("router.app", "abc")).unwrap());
        assert!(!store.delete(&key("router.app", "abc")).unwrap());
        assert!(store.get(&key("router.app", "abc")).unwrap().is_none());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RedbCacheStore::open(dir.path()).unwrap();
            store.put(&key("router.rtm", "abc"), b"rtm".to_vec(), 9).unwrap();
        }
        let reopened = RedbCacheStore::open(dir.path()).unwrap();
        let entry = reopened.get(&key("router.rtm", "abc")).unwrap().unwrap();
        assert_eq!(entry.payload, b"rtm");
        assert_eq!(reopened.len().unwrap(), 1);
    }

    #[test]
    fn list_keys_stays_inside_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbCacheStore::open(dir.path()).unwrap();
        store.put(&key("query", "a"), Vec::new(), 10).unwrap();
        store.put(&key("query", "b"), Vec::new(), 50).unwrap();
        store.put(&key("query0", "c"), Vec::new(), 10).unwrap();
        store.put(&key("quer", "d"), Vec::new(), 10).unwrap();

        let keys = store.list_keys_older_than("query", 20).unwrap();
        assert_eq!(keys, vec![key("query", "a")]);
    }

    #[test]
    fn keys_may_contain_separator() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbCacheStore::open(dir.path()).unwrap();
        store.put(&key("file", "a/b/c"), Vec::new(), 1).unwrap();

        let keys = store.list_keys_older_than("file", 2).unwrap();
        assert_eq!(keys, vec![key("file", "a/b/c")]);
    }
}
