//! Request coalescing.
//!
//! At most one resolution per key is in flight. The first caller for a key
//! opens a group and starts the fetch; later callers join the group. When the
//! fetch finishes, the group is removed under the router's lock and then the
//! same result is delivered to every member in registration order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::RouterError;

type Outcome<V> = Result<V, RouterError>;

/// In-flight resolutions keyed by application id.
#[derive(Debug)]
pub struct PendingGroups<V> {
    groups: HashMap<String, Vec<(u64, oneshot::Sender<Outcome<V>>)>>,
    next_id: u64,
}

impl<V> Default for PendingGroups<V> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<V> PendingGroups<V> {
    /// Adds a waiter for `key`. The flag is `true` when this call opened the
    /// group, in which case the caller is responsible for starting the fetch.
    fn join(&mut self, key: &str) -> (u64, oneshot::Receiver<Outcome<V>>, bool) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        let opened = match self.groups.get_mut(key) {
            Some(group) => {
                group.push((id, tx));
                false
            }
            None => {
                self.groups.insert(key.to_string(), vec![(id, tx)]);
                true
            }
        };
        (id, rx, opened)
    }

    /// Removes the group for `key` and returns its members in registration
    /// order.
    fn complete(&mut self, key: &str) -> Vec<oneshot::Sender<Outcome<V>>> {
        self.groups
            .remove(key)
            .map(|group| group.into_iter().map(|(_, tx)| tx).collect())
            .unwrap_or_default()
    }

    /// Drops one waiter. The group itself stays open even when empty: its
    /// fetch is still running and will remove it.
    fn remove_waiter(&mut self, key: &str, id: u64) -> bool {
        match self.groups.get_mut(key) {
            Some(group) => {
                let before = group.len();
                group.retain(|(waiter, _)| *waiter != id);
                group.len() != before
            }
            None => false,
        }
    }

    /// Whether a resolution for `key` is in flight.
    #[must_use]
    pub fn is_pending(&self, key: &str) -> bool {
        self.groups.contains_key(key)
    }

    /// Number of waiters currently registered for `key`.
    #[must_use]
    pub fn waiters(&self, key: &str) -> usize {
        self.groups.get(key).map_or(0, Vec::len)
    }
}

/// Router state that embeds a [`PendingGroups`] table.
pub(crate) trait HasPending<V>: Send + 'static {
    fn pending(&mut self) -> &mut PendingGroups<V>;
}

impl<V: Send + 'static> HasPending<V> for PendingGroups<V> {
    fn pending(&mut self) -> &mut PendingGroups<V> {
        self
    }
}

/// Joins (or opens) the group for `key` in `state`.
///
/// Returns the caller's [`Waiter`] and whether a new group was opened.
pub(crate) fn join<S, V>(state: &Arc<Mutex<S>>, key: &str) -> (Waiter<V>, bool)
where
    S: HasPending<V>,
    V: Send + 'static,
{
    let (id, rx, opened) = state.lock().pending().join(key);
    if opened {
        debug!(key = key, "Opened resolution group");
    } else {
        debug!(key = key, waiter = id, "Joined in-flight resolution");
    }

    let weak: Weak<Mutex<S>> = Arc::downgrade(state);
    let detach = Detach {
        key: key.to_string(),
        id,
        remove: Box::new(move |key, id| {
            if let Some(state) = weak.upgrade() {
                state.lock().pending().remove_waiter(key, id);
            }
        }),
    };

    (
        Waiter {
            rx,
            detach: Some(detach),
        },
        opened,
    )
}

/// Closes the group for `key` and hands `outcome` to every member.
///
/// The group is removed while the lock is held; delivery happens after the
/// lock is released.
pub(crate) fn finish<S, V>(state: &Mutex<S>, key: &str, outcome: &Outcome<V>)
where
    S: HasPending<V>,
    V: Clone,
{
    let members = state.lock().pending().complete(key);
    debug!(key = key, waiters = members.len(), "Delivering resolution");
    for tx in members {
        // A waiter that went away between removal and delivery is fine.
        let _ = tx.send(outcome.clone());
    }
}

/// Closes a group exactly once.
///
/// Held by the task that runs the fetch. If the task ends without calling
/// [`complete`](Self::complete), because it panicked or was aborted, the
/// guard's `Drop` closes the group with [`RouterError::Cancelled`] so its
/// members wake up and the next caller opens a fresh group.
pub(crate) struct CompletionGuard<S, V>
where
    S: HasPending<V>,
    V: Clone,
{
    state: Arc<Mutex<S>>,
    key: String,
    done: bool,
    _outcome: std::marker::PhantomData<fn() -> V>,
}

impl<S, V> CompletionGuard<S, V>
where
    S: HasPending<V>,
    V: Clone,
{
    pub(crate) fn new(state: &Arc<Mutex<S>>, key: &str) -> Self {
        Self {
            state: Arc::clone(state),
            key: key.to_string(),
            done: false,
            _outcome: std::marker::PhantomData,
        }
    }

    /// Delivers `outcome` to every member of the group.
    pub(crate) fn complete(mut self, outcome: &Outcome<V>) {
        self.done = true;
        finish(&self.state, &self.key, outcome);
    }
}

impl<S, V> Drop for CompletionGuard<S, V>
where
    S: HasPending<V>,
    V: Clone,
{
    fn drop(&mut self) {
        if !self.done {
            warn!(key = %self.key, "Resolution task ended without a result");
            finish(&self.state, &self.key, &Err(RouterError::Cancelled));
        }
    }
}

struct Detach {
    key: String,
    id: u64,
    remove: Box<dyn Fn(&str, u64) + Send + Sync>,
}

/// Handle to the outcome of an in-flight resolution.
///
/// Await it to receive the result. Dropping it, or calling
/// [`cancel`](Self::cancel), leaves the group without affecting the fetch or
/// the other members.
#[must_use = "a waiter does nothing unless awaited"]
pub struct Waiter<V> {
    rx: oneshot::Receiver<Outcome<V>>,
    detach: Option<Detach>,
}

impl<V> Waiter<V> {
    /// Leaves the group. The fetch keeps running for the other members.
    pub fn cancel(self) {
        drop(self);
    }
}

impl<V> Future for Waiter<V> {
    type Output = Outcome<V>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(outcome) => {
                // Delivered or abandoned: either way the group no longer
                // lists this waiter.
                self.detach = None;
                Poll::Ready(outcome.unwrap_or(Err(RouterError::Cancelled)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<V> Drop for Waiter<V> {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            (detach.remove)(&detach.key, detach.id);
        }
    }
}

impl<V> std::fmt::Debug for Waiter<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("key", &self.detach.as_ref().map(|d| d.key.as_str()))
            .finish_non_exhaustive()
    }
}
