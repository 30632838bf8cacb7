//! RTM router: discovers the realtime-messaging server group of an
//! application.
//!
//! Unlike the [`AppRouter`], failures are reported to the caller: there is no
//! meaningful fallback for a realtime server.

use std::collections::HashMap;
use std::sync::Arc;

use approute_core::{
    normalize_server_url, AppId, ClockSource, DocumentError, Module, RtmRouterDocument,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::pending::{self, CompletionGuard, HasPending, PendingGroups, Waiter};
use super::{is_fresh, AppRouter, RTM_GROUP_NAMESPACE, RTM_NAMESPACE};
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::storage::{codec, CacheKey, CacheStore};
use crate::transport::{get_with_timeout, with_query, RouterTransport};

type Document = Arc<RtmRouterDocument>;

/// Path appended to the app router's `rtm_router_server` to form the RTM
/// router endpoint.
const RTM_ROUTE_PATH: &str = "/v1/route";

/// Pending lookups and remembered group URLs, guarded together.
#[derive(Default)]
struct RtmState {
    pending: PendingGroups<Document>,
    groups: HashMap<String, String>,
}

impl HasPending<Document> for RtmState {
    fn pending(&mut self) -> &mut PendingGroups<Document> {
        &mut self.pending
    }
}

/// Resolves, caches and serves RTM server groups.
///
/// The endpoint queried for an application is, in order of preference, the
/// group URL remembered from an earlier response, the configured RTM router
/// URL, or the app router's RTM module URL plus `/v1/route`. A cached
/// document is only served while it came from the endpoint currently in
/// effect, so a redirect to a new group takes effect on the next lookup.
#[derive(Clone)]
pub struct RtmRouter {
    inner: Arc<Inner>,
}

struct Inner {
    config: RouterConfig,
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn RouterTransport>,
    clock: Arc<dyn ClockSource>,
    app_router: AppRouter,
    state: Arc<Mutex<RtmState>>,
}

impl RtmRouter {
    #[must_use]
    pub fn new(
        config: RouterConfig,
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn RouterTransport>,
        clock: Arc<dyn ClockSource>,
        app_router: AppRouter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                transport,
                clock,
                app_router,
                state: Arc::default(),
            }),
        }
    }

    /// Resolves the RTM server group for `app_id`.
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidAppId`] for an invalid id.
    /// - [`RouterError::NetworkFailure`] if the RTM router cannot be reached,
    ///   answers with a non-2xx status, or times out.
    /// - [`RouterError::MalformedResponse`] if the response cannot be decoded.
    /// - [`RouterError::NoFallbackAvailable`] if the response names no server
    ///   at all.
    pub async fn rtm_server(&self, app_id: &str) -> Result<Document, RouterError> {
        let app_id = AppId::parse(app_id)?;
        let entry = self.inner.entry_url(&app_id).await?;

        if let Some(doc) = self.inner.cached(&app_id, &entry) {
            return Ok(doc);
        }
        self.inner.start_or_join(&app_id, entry).await
    }

    /// Removes the cached document for `app_id`. The remembered group URL is
    /// kept. Returns whether a document was cached.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidAppId`] for an invalid id and
    /// [`RouterError::CacheUnavailable`] if the store cannot be written.
    pub fn invalidate(&self, app_id: &str) -> Result<bool, RouterError> {
        let app_id = AppId::parse(app_id)?;
        Ok(self
            .inner
            .store
            .delete(&CacheKey::new(RTM_NAMESPACE, app_id.as_str()))?)
    }

    /// Forgets the remembered group URL for `app_id`, so the next lookup
    /// starts from the configured or derived endpoint again.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidAppId`] for an invalid id and
    /// [`RouterError::CacheUnavailable`] if the store cannot be written.
    pub fn forget_group(&self, app_id: &str) -> Result<bool, RouterError> {
        let app_id = AppId::parse(app_id)?;
        let in_memory = self.inner.state.lock().groups.remove(app_id.as_str()).is_some();
        let persisted = self
            .inner
            .store
            .delete(&CacheKey::new(RTM_GROUP_NAMESPACE, app_id.as_str()))?;
        Ok(in_memory || persisted)
    }

    /// Whether a lookup for `app_id` is in flight.
    #[must_use]
    pub fn is_resolving(&self, app_id: &str) -> bool {
        self.inner.state.lock().pending.is_pending(app_id)
    }
}

impl Inner {
    fn remembered_group(&self, app_id: &AppId) -> Option<String> {
        if let Some(url) = self.state.lock().groups.get(app_id.as_str()) {
            return Some(url.clone());
        }

        let key = CacheKey::new(RTM_GROUP_NAMESPACE, app_id.as_str());
        let url = match self.store.get(&key) {
            Ok(Some(entry)) => match codec::decode::<String>(&key, &entry.payload) {
                Ok(url) => url,
                Err(e) => {
                    warn!(app_id = %app_id, error = %e, "Ignoring undecodable group URL");
                    return None;
                }
            },
            Ok(None) => return None,
            Err(e) => {
                warn!(app_id = %app_id, error = %e, "Cannot read remembered group URL");
                return None;
            }
        };

        let mut state = self.state.lock();
        Some(
            state
                .groups
                .entry(app_id.as_str().to_string())
                .or_insert(url)
                .clone(),
        )
    }

    async fn entry_url(&self, app_id: &AppId) -> Result<String, RouterError> {
        if let Some(url) = self.remembered_group(app_id) {
            return Ok(url);
        }
        if let Some(url) = &self.config.rtm_router_url {
            return Ok(normalize_server_url(url));
        }
        let server = self
            .app_router
            .url_for(app_id.as_str(), Module::RtmRouter)
            .await?;
        Ok(format!("{server}{RTM_ROUTE_PATH}"))
    }

    fn cached(&self, app_id: &AppId, entry: &str) -> Option<Document> {
        let key = CacheKey::new(RTM_NAMESPACE, app_id.as_str());
        let record = match self.store.get(&key) {
            Ok(record) => record,
            Err(e) => {
                warn!(app_id = %app_id, error = %e, "Cache read failed; treating as miss");
                None
            }
        };
        let doc = record.and_then(|record| {
            match codec::decode::<RtmRouterDocument>(&key, &record.payload) {
                Ok(doc)
                    if doc.source_url == entry
                        && is_fresh(record.fetched_at, doc.ttl, self.clock.now()) =>
                {
                    Some(Arc::new(doc))
                }
                Ok(_) => None,
                Err(e) => {
                    warn!(app_id = %app_id, error = %e, "Discarding undecodable cache entry");
                    None
                }
            }
        });

        if doc.is_some() {
            debug!(app_id = %app_id, "RTM router cache hit");
            metrics::counter!("approute_cache_hits_total", "router" => "rtm").increment(1);
        } else {
            metrics::counter!("approute_cache_misses_total", "router" => "rtm").increment(1);
        }
        doc
    }

    fn start_or_join(self: &Arc<Self>, app_id: &AppId, entry: String) -> Waiter<Document> {
        let (waiter, opened) = pending::join(&self.state, app_id.as_str());
        if opened {
            let guard = CompletionGuard::new(&self.state, app_id.as_str());
            let inner = Arc::clone(self);
            let app_id = app_id.clone();
            tokio::spawn(async move {
                let outcome = inner.fetch(&app_id, &entry).await;
                if let Err(e) = &outcome {
                    warn!(app_id = %app_id, entry = %entry, error = %e, "RTM router lookup failed");
                }
                guard.complete(&outcome);
            });
        }
        waiter
    }

    async fn fetch(&self, app_id: &AppId, entry: &str) -> Result<Document, RouterError> {
        let url = with_query(entry, &[("appId", app_id.as_str()), ("secure", "1")])?;

        info!(app_id = %app_id, url = %url, "Fetching RTM router document");
        metrics::counter!("approute_remote_fetches_total", "router" => "rtm").increment(1);

        let body = get_with_timeout(self.transport.as_ref(), &url, self.config.fetch_timeout).await?;
        let doc = RtmRouterDocument::from_response(&body, entry, self.config.default_ttl_secs)
            .map_err(|e| match e {
                DocumentError::Empty => RouterError::NoFallbackAvailable {
                    app_id: app_id.to_string(),
                },
                other => RouterError::from(other),
            })?;

        let now = self.clock.now();
        let key = CacheKey::new(RTM_NAMESPACE, app_id.as_str());
        if let Err(e) = codec::encode(&key, &doc).and_then(|p| self.store.put(&key, p, now)) {
            warn!(app_id = %app_id, error = %e, "Failed to cache RTM router document");
        }

        if let Some(group_url) = &doc.group_url {
            self.remember_group(app_id, &normalize_server_url(group_url), now);
        }

        Ok(Arc::new(doc))
    }

    fn remember_group(&self, app_id: &AppId, url: &str, now: u64) {
        let previous = self
            .state
            .lock()
            .groups
            .insert(app_id.as_str().to_string(), url.to_string());
        if previous.as_deref() == Some(url) {
            return;
        }

        info!(app_id = %app_id, group_url = url, "RTM router redirected to new group");
        let key = CacheKey::new(RTM_GROUP_NAMESPACE, app_id.as_str());
        if let Err(e) = codec::encode(&key, &url).and_then(|p| self.store.put(&key, p, now)) {
            warn!(app_id = %app_id, error = %e, "Failed to persist RTM group URL");
        }
    }
}

impl std::fmt::Debug for RtmRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtmRouter")
            .field("rtm_router_url", &self.inner.config.rtm_router_url)
            .finish_non_exhaustive()
    }
}
