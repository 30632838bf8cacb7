//! App and RTM routers.
//!
//! Both routers follow the same lookup path: a valid cached document is
//! served directly; otherwise the caller joins a coalesced fetch (see
//! [`pending`]). They differ in failure handling. The [`AppRouter`] absorbs
//! fetch failures with per-module fallback URLs, while the [`RtmRouter`]
//! reports them.

pub mod app;
pub mod pending;
pub mod rtm;

pub use app::AppRouter;
pub use pending::{PendingGroups, Waiter};
pub use rtm::RtmRouter;

/// Cache namespace of app-router documents.
pub const APP_NAMESPACE: &str = "router.app";
/// Cache namespace of RTM-router documents.
pub const RTM_NAMESPACE: &str = "router.rtm";
/// Cache namespace of remembered RTM group URLs.
pub const RTM_GROUP_NAMESPACE: &str = "router.rtm.group";

/// Whether a document fetched at `fetched_at` with a validity of `ttl_secs`
/// is still usable at `now`. All times are in milliseconds; the boundary
/// itself is still valid.
pub(crate) fn is_fresh(fetched_at: u64, ttl_secs: u64, now: u64) -> bool {
    now.saturating_sub(fetched_at) <= ttl_secs.saturating_mul(1000)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use approute_core::ManualClock;

    use crate::config::RouterConfig;
    use crate::overrides::ServerOverrides;
    use crate::storage::{CacheEntry, CacheError, CacheKey, CacheStore, MemoryCacheStore};
    use crate::transport::scripted::ScriptedTransport;

    pub(crate) const T0: u64 = 1_700_000_000_000;
    pub(crate) const APP_ROUTER: &str = "https://app-router.test/2/route";

    /// Store whose every operation fails.
    #[derive(Debug, Default)]
    pub(crate) struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::unavailable("disk unplugged"))
        }

        fn put(&self, _key: &CacheKey, _payload: Vec<u8>, _at: u64) -> Result<(), CacheError> {
            Err(CacheError::unavailable("disk unplugged"))
        }

        fn delete(&self, _key: &CacheKey) -> Result<bool, CacheError> {
            Err(CacheError::unavailable("disk unplugged"))
        }

        fn list_keys_older_than(
            &self,
            _namespace: &str,
            _cutoff: u64,
        ) -> Result<Vec<CacheKey>, CacheError> {
            Err(CacheError::unavailable("disk unplugged"))
        }

        fn len(&self) -> Result<usize, CacheError> {
            Err(CacheError::unavailable("disk unplugged"))
        }
    }

    /// Shared pieces every router test needs.
    pub(crate) struct Fixture {
        pub(crate) config: RouterConfig,
        pub(crate) store: Arc<dyn CacheStore>,
        pub(crate) transport: Arc<ScriptedTransport>,
        pub(crate) clock: ManualClock,
        pub(crate) overrides: Arc<ServerOverrides>,
    }

    impl Fixture {
        pub(crate) fn new(transport: ScriptedTransport) -> Self {
            Self {
                config: RouterConfig {
                    app_router_url: APP_ROUTER.to_string(),
                    ..RouterConfig::default()
                },
                store: Arc::new(MemoryCacheStore::new()),
                transport: Arc::new(transport),
                clock: ManualClock::new(T0),
                overrides: Arc::new(ServerOverrides::new()),
            }
        }

        pub(crate) fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
            self.store = store;
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ttl_boundary_is_inclusive() {
        assert!(is_fresh(1_000, 10, 11_000));
        assert!(!is_fresh(1_000, 10, 11_001));
        assert!(is_fresh(5_000, 0, 5_000));
    }

    #[test]
    fn entries_from_the_future_are_fresh() {
        assert!(is_fresh(10_000, 1, 2_000));
    }

    proptest! {
        #[test]
        fn freshness_matches_age(
            fetched_at in 0u64..1 << 50,
            age in 0u64..1 << 30,
            ttl in 0u64..1 << 20,
        ) {
            let now = fetched_at + age;
            prop_assert_eq!(is_fresh(fetched_at, ttl, now), age <= ttl * 1000);
        }
    }
}
