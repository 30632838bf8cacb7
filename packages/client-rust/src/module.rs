//! Router module: owns the cache store, both routers and the eviction
//! scheduler.
//!
//! `new()`/`open()` wire the components together without spawning anything;
//! `start()` launches the eviction scheduler and `stop()` shuts it down and
//! waits for it. Routers are usable in between as well as outside that window.

use std::sync::Arc;

use approute_core::{ClockSource, Module, SystemClock};
use tracing::info;

use crate::config::ModuleConfig;
use crate::error::RouterError;
use crate::overrides::ServerOverrides;
use crate::router::{AppRouter, RtmRouter};
use crate::scheduler::{sweep_blocking, EvictionScheduler, SweepReport};
use crate::storage::{CacheStore, MemoryCacheStore};
use crate::transport::{ReqwestTransport, RouterTransport};

/// Which router's cache [`RouterModule::clean_cache`] clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterCacheKind {
    App,
    /// The cached RTM document and the remembered group URL.
    Rtm,
}

/// Lifecycle owner of the routing components.
///
/// Replaces process-wide singletons: create one per client configuration
/// and share it (or its routers) explicitly.
pub struct RouterModule {
    config: ModuleConfig,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn ClockSource>,
    overrides: Arc<ServerOverrides>,
    app_router: AppRouter,
    rtm_router: RtmRouter,
    scheduler: Option<EvictionScheduler>,
}

impl RouterModule {
    /// Wires the routers over explicitly supplied collaborators.
    #[must_use]
    pub fn new(
        config: ModuleConfig,
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn RouterTransport>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let overrides = Arc::new(ServerOverrides::new());
        let app_router = AppRouter::new(
            config.router.clone(),
            Arc::clone(&store),
            Arc::clone(&transport),
            Arc::clone(&clock),
            Arc::clone(&overrides),
        );
        let rtm_router = RtmRouter::new(
            config.router.clone(),
            Arc::clone(&store),
            transport,
            Arc::clone(&clock),
            app_router.clone(),
        );

        Self {
            config,
            store,
            clock,
            overrides,
            app_router,
            rtm_router,
            scheduler: None,
        }
    }

    /// Builds a module with the production collaborators: the persistent
    /// store in `cache_dir` (in-memory when unset), the `reqwest` transport
    /// and the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be opened or the HTTP
    /// client cannot be built.
    pub fn open(config: ModuleConfig) -> anyhow::Result<Self> {
        let store = open_store(&config)?;
        let transport = Arc::new(ReqwestTransport::new(config.router.fetch_timeout)?);
        Ok(Self::new(config, store, transport, Arc::new(SystemClock)))
    }

    /// Starts the eviction scheduler. Does nothing if already started.
    /// Must be called within a Tokio runtime.
    pub fn start(&mut self) {
        if self.scheduler.is_some() {
            return;
        }
        self.scheduler = Some(EvictionScheduler::start(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.config.scheduler.clone(),
        ));
        info!("Router module started");
    }

    /// Stops the eviction scheduler and waits for it to exit.
    pub async fn stop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop().await;
            info!("Router module stopped");
        }
    }

    #[must_use]
    pub fn app_router(&self) -> &AppRouter {
        &self.app_router
    }

    #[must_use]
    pub fn rtm_router(&self) -> &RtmRouter {
        &self.rtm_router
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn CacheStore> {
        Arc::clone(&self.store)
    }

    /// The running scheduler, if [`start`](Self::start) was called.
    #[must_use]
    pub fn scheduler(&self) -> Option<&EvictionScheduler> {
        self.scheduler.as_ref()
    }

    /// Clears the cached routing data of one router for `app_id`.
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidAppId`] for an invalid id and
    /// [`RouterError::CacheUnavailable`] if the store cannot be written.
    pub fn clean_cache(&self, app_id: &str, kind: RouterCacheKind) -> Result<bool, RouterError> {
        match kind {
            RouterCacheKind::App => self.app_router.invalidate(app_id),
            RouterCacheKind::Rtm => {
                let document = self.rtm_router.invalidate(app_id)?;
                let group = self.rtm_router.forget_group(app_id)?;
                Ok(document || group)
            }
        }
    }

    /// Pins `module` to `url`, or removes the pin with `None`.
    pub fn set_custom_server_url(&self, url: Option<&str>, module: Module) {
        self.overrides.set_module(module, url);
    }

    /// Pins every module to `url`, or removes the pin with `None`.
    /// Per-module pins still win.
    pub fn set_server_url(&self, url: Option<&str>) {
        self.overrides.set_global(url);
    }

    /// Runs one eviction sweep and returns its report.
    ///
    /// Goes through the scheduler when it is running, so its current
    /// settings apply; otherwise sweeps with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the running scheduler stopped mid-request.
    pub async fn sweep_now(&self) -> anyhow::Result<SweepReport> {
        match &self.scheduler {
            Some(scheduler) => scheduler.sweep_now().await,
            None => Ok(sweep_blocking(
                Arc::clone(&self.store),
                Arc::new(self.config.scheduler.settings.clone()),
                self.clock.now(),
            )
            .await),
        }
    }
}

impl std::fmt::Debug for RouterModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterModule")
            .field("cache_dir", &self.config.cache_dir)
            .field("started", &self.scheduler.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "redb")]
fn open_store(config: &ModuleConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    match &config.cache_dir {
        Some(dir) => {
            let store = crate::storage::RedbCacheStore::open(dir)?;
            info!(path = %store.path().display(), "Opened persistent router cache");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryCacheStore::new())),
    }
}

#[cfg(not(feature = "redb"))]
fn open_store(config: &ModuleConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    if let Some(dir) = &config.cache_dir {
        tracing::warn!(
            cache_dir = %dir.display(),
            "Built without persistent storage; using an in-memory cache"
        );
    }
    Ok(Arc::new(MemoryCacheStore::new()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approute_core::ManualClock;

    use super::*;
    use crate::config::{SchedulerConfig, SchedulerSettings};
    use crate::router::test_support::APP_ROUTER;
    use crate::router::APP_NAMESPACE;
    use crate::storage::CacheKey;
    use crate::transport::scripted::ScriptedTransport;

    const APP: &str = "abc123";
    const NOW: u64 = 1_700_000_000_000;

    fn module(transport: ScriptedTransport) -> RouterModule {
        let config = ModuleConfig {
            router: crate::config::RouterConfig {
                app_router_url: APP_ROUTER.to_string(),
                ..Default::default()
            },
            scheduler: SchedulerConfig {
                sweep_interval: Duration::from_secs(3600),
                settings: SchedulerSettings::default(),
            },
            ..Default::default()
        };
        RouterModule::new(
            config,
            Arc::new(MemoryCacheStore::new()),
            Arc::new(transport),
            Arc::new(ManualClock::new(NOW)),
        )
    }

    #[tokio::test]
    async fn overrides_apply_to_the_app_router() {
        let module = module(ScriptedTransport::new());
        module.set_server_url(Some("everything.example.com"));
        module.set_custom_server_url(Some("https://push.example.com"), Module::Push);

        let router = module.app_router();
        assert_eq!(
            router.url_for(APP, Module::Api).await.unwrap(),
            "https://everything.example.com"
        );
        assert_eq!(
            router.url_for(APP, Module::Push).await.unwrap(),
            "https://push.example.com"
        );

        module.set_server_url(None);
        module.set_custom_server_url(None, Module::Push);
        // Router unreachable (404 from the scripted transport): fallback.
        assert_eq!(
            router.url_for(APP, Module::Api).await.unwrap(),
            "https://abc123.api.lncld.net"
        );
    }

    #[tokio::test]
    async fn clean_cache_removes_app_documents() {
        let module = module(ScriptedTransport::new().respond(
            APP_ROUTER,
            200,
            r#"{"api_server": "api.example.com"}"#,
        ));
        module.app_router().url_for(APP, Module::Api).await.unwrap();
        assert!(module
            .store()
            .get(&CacheKey::new(APP_NAMESPACE, APP))
            .unwrap()
            .is_some());

        assert!(module.clean_cache(APP, RouterCacheKind::App).unwrap());
        assert!(!module.clean_cache(APP, RouterCacheKind::App).unwrap());
        assert!(!module.clean_cache(APP, RouterCacheKind::Rtm).unwrap());
        assert!(module.clean_cache("", RouterCacheKind::App).is_err());
    }

    #[tokio::test]
    async fn start_stop_lifecycle() {
        let mut module = module(ScriptedTransport::new());
        assert!(module.scheduler().is_none());

        module.start();
        module.start();
        assert!(module.scheduler().is_some());

        let store = module.store();
        store
            .put(&CacheKey::new("query", "old"), Vec::new(), NOW - 40 * 86_400_000)
            .unwrap();
        assert_eq!(module.sweep_now().await.unwrap().deleted, 1);

        module.stop().await;
        assert!(module.scheduler().is_none());
        // Without a running scheduler the sweep happens inline.
        assert_eq!(module.sweep_now().await.unwrap().deleted, 0);
    }

    #[cfg(feature = "redb")]
    #[tokio::test]
    async fn open_uses_the_cache_directory() {
        let dir = tempfile::tempdir().unwrap();
        let module = RouterModule::open(ModuleConfig {
            cache_dir: Some(dir.path().join("router")),
            ..Default::default()
        })
        .unwrap();

        module.store().put(&CacheKey::new("query", "k"), vec![1], NOW).unwrap();
        assert!(dir.path().join("router").join("router.redb").exists());
    }
}
