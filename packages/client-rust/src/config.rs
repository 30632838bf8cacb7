//! Configuration for the routers, the eviction scheduler and the module
//! that owns them.

use std::path::PathBuf;
use std::time::Duration;

/// Default app-router endpoint.
pub const DEFAULT_APP_ROUTER_URL: &str = "https://app-router.com/2/route";

/// REST API version prefixed to request paths.
pub const DEFAULT_API_VERSION: &str = "1.1";

/// Router-level configuration.
///
/// Controls where documents are fetched from, how long a fetch may take, and
/// how long documents without an explicit `ttl` stay valid.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// App-router endpoint queried with `?appId=...`.
    pub app_router_url: String,
    /// Fixed RTM router endpoint. When `None`, the endpoint is derived from
    /// the app router's `rtm_router_server` for the application.
    pub rtm_router_url: Option<String>,
    /// Upper bound for a single remote fetch.
    pub fetch_timeout: Duration,
    /// Validity window applied to documents that omit `ttl`, in seconds.
    pub default_ttl_secs: u64,
    /// Version segment used by `app_url_for_path` and `batch_path_for_path`.
    pub api_version: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            app_router_url: DEFAULT_APP_ROUTER_URL.to_string(),
            rtm_router_url: None,
            fetch_timeout: Duration::from_secs(15),
            default_ttl_secs: 3600,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

/// Expiration policy for the eviction scheduler.
///
/// Mutable at runtime through
/// [`EvictionScheduler::update_settings`](crate::scheduler::EvictionScheduler::update_settings);
/// changes apply from the next sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Query-cache entries older than this many days are evicted. `0` disables.
    pub query_cache_expiration_days: u32,
    /// File-cache entries older than this many days are evicted. `0` disables.
    pub file_cache_expiration_days: u32,
    /// Namespaces holding query-cache entries. Must be non-empty and free of
    /// `/`; invalid names are skipped by the sweep.
    pub query_namespaces: Vec<String>,
    /// Namespaces holding file-cache entries, with the same naming rules.
    pub file_namespaces: Vec<String>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            query_cache_expiration_days: 30,
            file_cache_expiration_days: 30,
            query_namespaces: vec!["query".to_string()],
            file_namespaces: vec!["file".to_string()],
        }
    }
}

/// Eviction scheduler configuration: how often to sweep and what to evict.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between periodic sweeps.
    pub sweep_interval: Duration,
    pub settings: SchedulerSettings,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(3600),
            settings: SchedulerSettings::default(),
        }
    }
}

/// Top-level configuration for [`RouterModule`](crate::RouterModule).
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    /// Directory holding the persistent cache. `None` keeps the cache in
    /// memory only.
    pub cache_dir: Option<PathBuf>,
    pub router: RouterConfig,
    pub scheduler: SchedulerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.app_router_url, DEFAULT_APP_ROUTER_URL);
        assert!(config.rtm_router_url.is_none());
        assert_eq!(config.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.api_version, "1.1");
    }

    #[test]
    fn scheduler_defaults_cover_query_and_file_namespaces() {
        let config = SchedulerConfig::default();
        assert_eq!(config.settings.query_namespaces, vec!["query"]);
        assert_eq!(config.settings.file_namespaces, vec!["file"]);
        assert!(config.sweep_interval > Duration::ZERO);
    }

    #[test]
    fn module_defaults_to_in_memory_cache() {
        assert!(ModuleConfig::default().cache_dir.is_none());
    }
}
