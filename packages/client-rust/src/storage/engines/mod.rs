//! Concrete [`CacheStore`](crate::storage::CacheStore) implementations.

pub mod memory;
#[cfg(feature = "redb")]
pub mod redb;

pub use memory::MemoryCacheStore;
#[cfg(feature = "redb")]
pub use self::redb::RedbCacheStore;
