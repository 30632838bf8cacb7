//! Background eviction of expired cache entries.

pub mod eviction;
pub mod worker;

pub use eviction::{
    sweep, sweep_blocking, sweep_namespace, EvictionScheduler, SweepReport, SweepTask,
};
pub use worker::{BackgroundRunnable, BackgroundWorker};
