//! Cache storage for resolved router state.
//!
//! - [`CacheStore`]: the namespaced key-value contract shared by routers and
//!   the eviction scheduler.
//! - [`engines`]: in-memory (`DashMap`) and persistent (`redb`) backends.
//! - [`codec`]: `MsgPack` encoding of cached documents.

pub mod codec;
pub mod engines;
pub mod store;

pub use engines::MemoryCacheStore;
#[cfg(feature = "redb")]
pub use engines::RedbCacheStore;
pub use store::{CacheEntry, CacheError, CacheKey, CacheStore};
