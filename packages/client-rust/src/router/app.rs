//! App router: resolves the server URL of each service module for an
//! application.

use std::sync::Arc;

use approute_core::{AppId, ClockSource, FallbackResolver, Module, RouterDocument};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::pending::{self, CompletionGuard, PendingGroups, Waiter};
use super::{is_fresh, APP_NAMESPACE};
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::overrides::ServerOverrides;
use crate::storage::{codec, CacheKey, CacheStore};
use crate::transport::{get_with_timeout, with_query, RouterTransport};

type Document = Arc<RouterDocument>;

/// Resolves, caches and serves module → URL tables.
///
/// Lookup order for [`url_for`](Self::url_for):
///
/// 1. administrator override ([`ServerOverrides`]);
/// 2. valid cached document;
/// 3. coalesced remote fetch;
/// 4. deterministic fallback URL ([`FallbackResolver`]).
///
/// Fetch failures are never cached and never reach the caller; the module
/// falls back instead. Cheap to clone: clones share all state.
#[derive(Clone)]
pub struct AppRouter {
    inner: Arc<Inner>,
}

struct Inner {
    config: RouterConfig,
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn RouterTransport>,
    clock: Arc<dyn ClockSource>,
    overrides: Arc<ServerOverrides>,
    pending: Arc<Mutex<PendingGroups<Document>>>,
}

impl AppRouter {
    #[must_use]
    pub fn new(
        config: RouterConfig,
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn RouterTransport>,
        clock: Arc<dyn ClockSource>,
        overrides: Arc<ServerOverrides>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                transport,
                clock,
                overrides,
                pending: Arc::default(),
            }),
        }
    }

    /// Resolves the URL of `module` for `app_id`.
    ///
    /// Suspends only when a remote fetch is needed. Concurrent callers for
    /// the same application share one fetch.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidAppId`] if `app_id` is not a valid
    /// application id. Every other failure resolves to a fallback URL.
    pub async fn url_for(&self, app_id: &str, module: Module) -> Result<String, RouterError> {
        let app_id = AppId::parse(app_id)?;
        if let Some(url) = self.inner.overrides.get(module) {
            return Ok(url);
        }
        if let Some(doc) = self.inner.cached(&app_id) {
            return Ok(self.inner.pick(&app_id, &doc, module));
        }

        match self.inner.start_or_join(&app_id).await {
            Ok(doc) => Ok(self.inner.pick(&app_id, &doc, module)),
            Err(e) => {
                warn!(app_id = %app_id, module = %module, error = %e, "Router fetch failed; using fallback");
                Ok(self.inner.fallback(&app_id, module))
            }
        }
    }

    /// Resolves the URL of `module` without suspending.
    ///
    /// Returns the override, the cached URL, or the fallback URL. When the
    /// cache is cold or expired a background refresh is started, so a later
    /// call sees the fetched document.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidAppId`] if `app_id` is not a valid
    /// application id.
    pub fn url_for_now(&self, app_id: &str, module: Module) -> Result<String, RouterError> {
        let app_id = AppId::parse(app_id)?;
        if let Some(url) = self.inner.overrides.get(module) {
            return Ok(url);
        }
        if let Some(doc) = self.inner.cached(&app_id) {
            return Ok(self.inner.pick(&app_id, &doc, module));
        }

        if tokio::runtime::Handle::try_current().is_ok() {
            self.inner.start_or_join(&app_id).cancel();
        } else {
            debug!(app_id = %app_id, "No runtime; skipping background refresh");
        }
        Ok(self.inner.fallback(&app_id, module))
    }

    /// Forces a fetch for `app_id`, joining one already in flight.
    ///
    /// The returned [`Waiter`] yields the fetched document (or the fetch
    /// error) when awaited; it may also be dropped, in which case the fetch
    /// still completes and updates the cache. Must be called within a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidAppId`] if `app_id` is not a valid
    /// application id.
    pub fn refresh_async(&self, app_id: &str) -> Result<Waiter<Document>, RouterError> {
        let app_id = AppId::parse(app_id)?;
        Ok(self.inner.start_or_join(&app_id))
    }

    /// Removes the cached document for `app_id`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidAppId`] for an invalid id and
    /// [`RouterError::CacheUnavailable`] if the store cannot be written.
    pub fn invalidate(&self, app_id: &str) -> Result<bool, RouterError> {
        let app_id = AppId::parse(app_id)?;
        let removed = self
            .inner
            .store
            .delete(&CacheKey::new(APP_NAMESPACE, app_id.as_str()))?;
        debug!(app_id = %app_id, removed, "Invalidated app router cache");
        Ok(removed)
    }

    /// The valid cached document for `app_id`, if any. Never fetches.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidAppId`] if `app_id` is not a valid
    /// application id.
    pub fn document(&self, app_id: &str) -> Result<Option<Document>, RouterError> {
        let app_id = AppId::parse(app_id)?;
        Ok(self.inner.cached(&app_id))
    }

    /// Full REST URL for `path` on the application's API server, e.g.
    /// `https://abc.api.lncld.net/1.1/classes/Todo`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidAppId`] if `app_id` is not a valid
    /// application id.
    pub async fn app_url_for_path(&self, app_id: &str, path: &str) -> Result<String, RouterError> {
        let api = self.url_for(app_id, Module::Api).await?;
        Ok(format!("{api}{}", self.batch_path_for_path(path)))
    }

    /// Versioned path used inside batch request bodies, e.g.
    /// `/1.1/classes/Todo`.
    #[must_use]
    pub fn batch_path_for_path(&self, path: &str) -> String {
        format!(
            "/{}/{}",
            self.inner.config.api_version,
            path.trim_start_matches('/')
        )
    }
}

impl Inner {
    fn cache_key(app_id: &AppId) -> CacheKey {
        CacheKey::new(APP_NAMESPACE, app_id.as_str())
    }

    /// Valid cached document. Unreadable or undecodable entries count as a
    /// miss.
    fn cached(&self, app_id: &AppId) -> Option<Document> {
        let key = Self::cache_key(app_id);
        let entry = match self.store.get(&key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                metrics::counter!("approute_cache_misses_total", "router" => "app").increment(1);
                return None;
            }
            Err(e) => {
                warn!(app_id = %app_id, error = %e, "Cache read failed; treating as miss");
                metrics::counter!("approute_cache_misses_total", "router" => "app").increment(1);
                return None;
            }
        };

        match codec::decode::<RouterDocument>(&key, &entry.payload) {
            Ok(doc) if is_fresh(entry.fetched_at, doc.ttl, self.clock.now()) => {
                debug!(app_id = %app_id, "App router cache hit");
                metrics::counter!("approute_cache_hits_total", "router" => "app").increment(1);
                Some(Arc::new(doc))
            }
            Ok(_) => {
                debug!(app_id = %app_id, "App router cache expired");
                metrics::counter!("approute_cache_misses_total", "router" => "app").increment(1);
                None
            }
            Err(e) => {
                warn!(app_id = %app_id, error = %e, "Discarding undecodable cache entry");
                metrics::counter!("approute_cache_misses_total", "router" => "app").increment(1);
                None
            }
        }
    }

    fn pick(&self, app_id: &AppId, doc: &RouterDocument, module: Module) -> String {
        match doc.server(module) {
            Some(url) => url.to_string(),
            None => self.fallback(app_id, module),
        }
    }

    fn fallback(&self, app_id: &AppId, module: Module) -> String {
        metrics::counter!("approute_fallbacks_total", "router" => "app").increment(1);
        FallbackResolver::resolve(app_id, module)
    }

    /// Joins the group for `app_id`, spawning the fetch if the group is new.
    fn start_or_join(self: &Arc<Self>, app_id: &AppId) -> Waiter<Document> {
        let (waiter, opened) = pending::join(&self.pending, app_id.as_str());
        if opened {
            let guard = CompletionGuard::new(&self.pending, app_id.as_str());
            let inner = Arc::clone(self);
            let app_id = app_id.clone();
            tokio::spawn(async move {
                let outcome = inner.fetch(&app_id).await;
                guard.complete(&outcome);
            });
        }
        waiter
    }

    async fn fetch(&self, app_id: &AppId) -> Result<Document, RouterError> {
        let base = &self.config.app_router_url;
        let url = with_query(base, &[("appId", app_id.as_str())])?;

        info!(app_id = %app_id, url = %url, "Fetching app router document");
        metrics::counter!("approute_remote_fetches_total", "router" => "app").increment(1);

        let body = get_with_timeout(self.transport.as_ref(), &url, self.config.fetch_timeout).await?;
        let doc = RouterDocument::from_response(&body, base, self.config.default_ttl_secs)?;

        let key = Self::cache_key(app_id);
        let written = codec::encode(&key, &doc)
            .and_then(|payload| self.store.put(&key, payload, self.clock.now()));
        if let Err(e) = written {
            warn!(app_id = %app_id, error = %e, "Failed to cache app router document");
        }

        Ok(Arc::new(doc))
    }
}

impl std::fmt::Debug for AppRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRouter")
            .field("app_router_url", &self.inner.config.app_router_url)
            .finish_non_exhaustive()
    }
}
