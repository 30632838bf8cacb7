//! Periodic eviction of old query-cache and file-cache entries.

use std::sync::Arc;
use std::time::Duration;

use approute_core::ClockSource;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::worker::{BackgroundRunnable, BackgroundWorker};
use crate::config::{SchedulerConfig, SchedulerSettings};
use crate::storage::{CacheKey, CacheStore};

const DAY_MILLIS: u64 = 86_400_000;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries removed.
    pub deleted: usize,
    /// Entries (or whole namespaces) that could not be listed or removed.
    pub failed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

/// Removes every entry in `namespace` fetched before `cutoff`.
///
/// Keeps going after a failed delete. A failed listing, or a namespace that
/// is empty or contains `/`, counts as one failure.
pub fn sweep_namespace(store: &dyn CacheStore, namespace: &str, cutoff: u64) -> SweepReport {
    if !CacheKey::is_valid_namespace(namespace) {
        warn!(namespace = namespace, "Skipping invalid cache namespace");
        return SweepReport {
            deleted: 0,
            failed: 1,
        };
    }
    let keys = match store.list_keys_older_than(namespace, cutoff) {
        Ok(keys) => keys,
        Err(e) => {
            warn!(namespace = namespace, error = %e, "Cannot list expired entries");
            return SweepReport {
                deleted: 0,
                failed: 1,
            };
        }
    };

    let mut report = SweepReport::default();
    for key in &keys {
        match delete(store, key) {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to evict cache entry");
                report.failed += 1;
            }
        }
    }
    report
}

fn delete(store: &dyn CacheStore, key: &CacheKey) -> Result<(), crate::storage::CacheError> {
    // An entry that vanished concurrently is as good as deleted.
    store.delete(key).map(|_| ())
}

/// Runs one full sweep over the query and file namespaces in `settings`.
///
/// A class with an expiration of `0` days is skipped.
pub fn sweep(store: &dyn CacheStore, settings: &SchedulerSettings, now: u64) -> SweepReport {
    let classes = [
        (settings.query_cache_expiration_days, &settings.query_namespaces),
        (settings.file_cache_expiration_days, &settings.file_namespaces),
    ];

    let mut report = SweepReport::default();
    for (days, namespaces) in classes {
        if days == 0 {
            continue;
        }
        let cutoff = now.saturating_sub(u64::from(days) * DAY_MILLIS);
        for namespace in namespaces {
            report.merge(sweep_namespace(store, namespace, cutoff));
        }
    }
    report
}

/// Runs [`sweep`] on the blocking thread pool.
///
/// Store engines do synchronous file I/O; a sweep touches many keys, so it
/// stays off the async worker threads. A sweep that panics is reported as one
/// failure.
pub async fn sweep_blocking(
    store: Arc<dyn CacheStore>,
    settings: Arc<SchedulerSettings>,
    now: u64,
) -> SweepReport {
    match tokio::task::spawn_blocking(move || sweep(store.as_ref(), &settings, now)).await {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "Cache eviction sweep aborted");
            SweepReport {
                deleted: 0,
                failed: 1,
            }
        }
    }
}

/// Tasks accepted by the eviction worker.
#[derive(Debug)]
pub enum SweepTask {
    /// Sweep immediately, optionally reporting the result back.
    RunNow(Option<oneshot::Sender<SweepReport>>),
}

/// [`BackgroundRunnable`] that sweeps on every tick and on demand.
pub struct EvictionSweeper {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn ClockSource>,
    settings: Arc<ArcSwap<SchedulerSettings>>,
}

impl EvictionSweeper {
    async fn sweep(&self) -> SweepReport {
        let report = sweep_blocking(
            Arc::clone(&self.store),
            self.settings.load_full(),
            self.clock.now(),
        )
        .await;

        metrics::counter!("approute_evicted_entries_total").increment(report.deleted as u64);
        if report.deleted > 0 || report.failed > 0 {
            info!(
                deleted = report.deleted,
                failed = report.failed,
                "Cache eviction sweep finished"
            );
        } else {
            debug!("Cache eviction sweep found nothing to evict");
        }
        report
    }
}

#[async_trait]
impl BackgroundRunnable for EvictionSweeper {
    type Task = SweepTask;

    async fn run(&mut self, task: SweepTask) {
        match task {
            SweepTask::RunNow(reply) => {
                let report = self.sweep().await;
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        self.sweep().await;
    }

    async fn shutdown(&mut self) {
        debug!("Eviction scheduler stopped");
    }
}

/// Background eviction of old cache entries.
///
/// Sweeps every `sweep_interval`, starting one interval after
/// [`start`](Self::start). The expiration policy can be replaced at runtime
/// and applies from the next sweep.
pub struct EvictionScheduler {
    worker: BackgroundWorker<EvictionSweeper>,
    settings: Arc<ArcSwap<SchedulerSettings>>,
    interval: Duration,
}

impl EvictionScheduler {
    /// Spawns the scheduler. Must be called within a Tokio runtime.
    pub fn start(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn ClockSource>,
        config: SchedulerConfig,
    ) -> Self {
        let settings = Arc::new(ArcSwap::from_pointee(config.settings));
        let sweeper = EvictionSweeper {
            store,
            clock,
            settings: Arc::clone(&settings),
        };
        info!(
            interval_secs = config.sweep_interval.as_secs(),
            "Eviction scheduler started"
        );
        Self {
            worker: BackgroundWorker::start(sweeper, config.sweep_interval),
            settings,
            interval: config.sweep_interval,
        }
    }

    /// Runs a sweep now and waits for its report.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler has been stopped.
    pub async fn sweep_now(&self) -> anyhow::Result<SweepReport> {
        let (tx, rx) = oneshot::channel();
        self.worker.submit(SweepTask::RunNow(Some(tx))).await?;
        Ok(rx.await?)
    }

    /// The expiration policy in effect.
    #[must_use]
    pub fn settings(&self) -> Arc<SchedulerSettings> {
        self.settings.load_full()
    }

    /// Replaces the expiration policy.
    pub fn update_settings(&self, settings: SchedulerSettings) {
        self.settings.store(Arc::new(settings));
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Stops the scheduler and waits for the background task to exit.
    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }
}

impl std::fmt::Debug for EvictionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionScheduler")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
