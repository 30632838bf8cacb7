//! Cache store trait and entry types.
//!
//! Defines [`CacheStore`], the durable key-value layer shared by the routers
//! and the eviction scheduler. Keys are namespaced so unrelated caches (app
//! router, RTM router, query results, files) never collide.

use std::fmt;

/// Errors surfaced by a [`CacheStore`].
///
/// I/O problems are never reported as a miss: a store that cannot be read
/// returns [`CacheError::Unavailable`] and the caller decides whether to
/// degrade or fail.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cached payload for {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

impl CacheError {
    /// Wraps any displayable backend error as [`CacheError::Unavailable`].
    pub fn unavailable(e: impl fmt::Display) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Namespaced cache key.
///
/// Namespaces must not contain `/`; persistent engines use it as the
/// separator between namespace and key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub namespace: String,
    pub key: String,
}

impl CacheKey {
    /// Creates a key in `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

impl CacheKey {
    /// Whether `namespace` is usable: non-empty and free of `/`.
    #[must_use]
    pub fn is_valid_namespace(namespace: &str) -> bool {
        !namespace.is_empty() && !namespace.contains('/')
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}

/// A stored payload together with the time it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Opaque serialized payload.
    pub payload: Vec<u8>,
    /// Milliseconds since the Unix epoch at which the payload was fetched.
    pub fetched_at: u64,
}

impl CacheEntry {
    /// Age of the entry at `now`, in milliseconds. Entries from the future are age 0.
    #[must_use]
    pub fn age_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.fetched_at)
    }
}

/// Durable namespaced key-value store.
///
/// Implementations must be internally synchronized: routers and the
/// scheduler call into the same instance concurrently without any external
/// lock. Used as `Arc<dyn CacheStore>`.
///
/// Calls are synchronous and may block on disk I/O. Routers issue single-key
/// calls inline; bulk work such as an eviction sweep goes through
/// [`sweep_blocking`](crate::scheduler::sweep_blocking).
pub trait CacheStore: Send + Sync + 'static {
    /// Retrieve an entry, or `None` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing storage cannot be read.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or replace an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write cannot be made durable.
    fn put(&self, key: &CacheKey, payload: Vec<u8>, fetched_at: u64) -> Result<(), CacheError>;

    /// Remove an entry. Returns whether an entry existed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing storage cannot be written.
    fn delete(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Keys in `namespace` whose `fetched_at` is strictly before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing storage cannot be read.
    fn list_keys_older_than(&self, namespace: &str, cutoff: u64)
        -> Result<Vec<CacheKey>, CacheError>;

    /// Number of entries across all namespaces.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing storage cannot be read.
    fn len(&self) -> Result<usize, CacheError>;

    /// Whether the store holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing storage cannot be read.
    fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display_joins_namespace_and_key() {
        assert_eq!(CacheKey::new("router.app", "abc").to_string(), "router.app/abc");
    }

    #[test]
    fn namespaces_must_be_non_empty_without_separator() {
        assert!(CacheKey::is_valid_namespace("router.rtm.group"));
        assert!(!CacheKey::is_valid_namespace(""));
        assert!(!CacheKey::is_valid_namespace("query/v2"));
    }

    #[test]
    fn age_saturates_for_future_entries() {
        let entry = CacheEntry {
            key: CacheKey::new("ns", "k"),
            payload: Vec::new(),
            fetched_at: 5_000,
        };
        assert_eq!(entry.age_millis(7_500), 2_500);
        assert_eq!(entry.age_millis(1_000), 0);
    }
}
