//! Registry of connections managed by a switchboard.
//!
//! `Registry` maps [`ConnectionId`]s to the shared [`Link`] of each
//! connection together with the handle of its ingestion task. Membership
//! may change while other tasks enumerate it; counts and random picks are
//! therefore best-effort under churn rather than point-in-time exact.

use std::sync::{
    Arc,
    Mutex,
    PoisonError,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::task::{self, JoinHandle};

use crate::connection::{ConnectionId, Link};

/// A registered connection: its link and the task reading from it.
pub(crate) struct Entry {
    link: Arc<Link>,
    reader: JoinHandle<()>,
}

impl Entry {
    pub(crate) fn new(link: Arc<Link>, reader: JoinHandle<()>) -> Self { Self { link, reader } }

    /// Wait for the ingestion task to exit.
    ///
    /// The task identified by `caller` is not awaited: it is the one doing
    /// the closing and cannot finish before this returns.
    async fn join(self, caller: Option<task::Id>) {
        if caller == Some(self.reader.id()) {
            return;
        }
        if let Err(e) = self.reader.await {
            debug!(
                "ingestion task ended abnormally: id={}, error={e}",
                self.link.id()
            );
        }
    }
}

/// Concurrent registry of connections keyed by [`ConnectionId`].
pub struct Registry {
    conns: DashMap<ConnectionId, Entry>,
    next_id: AtomicU64,
    rng: Mutex<StdRng>,
}

impl Default for Registry {
    fn default() -> Self { Self::with_rng(StdRng::from_os_rng()) }
}

impl Registry {
    /// Create an empty registry drawing random picks from `rng`.
    #[must_use]
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            conns: DashMap::new(),
            next_id: AtomicU64::new(0),
            rng: Mutex::new(rng),
        }
    }

    /// Allocate the next connection identifier. Identifiers are never reused.
    pub(crate) fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert a newly registered connection.
    pub(crate) fn insert(&self, id: ConnectionId, entry: Entry) {
        self.conns.insert(id, entry);
        crate::metrics::inc_connections();
    }

    /// Number of registered connections.
    ///
    /// Not isolated from concurrent inserts or removals.
    #[must_use]
    pub fn count(&self) -> usize { self.conns.len() }

    /// Returns `true` when no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.conns.is_empty() }

    /// Fetch the link registered under `id`.
    #[must_use]
    pub fn lookup(&self, id: ConnectionId) -> Option<Arc<Link>> {
        self.conns.get(&id).map(|entry| Arc::clone(&entry.link))
    }

    /// Identifiers of all registered connections, in no particular order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> { self.conns.iter().map(|entry| *entry.key()).collect() }

    /// Pick a connection uniformly at random.
    ///
    /// The position is drawn from the current count and then located with a
    /// single pass over the map. If connections were removed in between and
    /// the position is no longer reachable, the last entry visited is
    /// returned instead. Returns `None` only when the registry is empty.
    #[must_use]
    pub fn pick(&self) -> Option<Arc<Link>> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        self.nth_or_last(self.draw(count))
    }

    /// Link at position `target` of a single pass, or the last one visited
    /// if the map holds fewer entries by now.
    fn nth_or_last(&self, target: usize) -> Option<Arc<Link>> {
        let mut picked = None;
        for (ordinal, entry) in self.conns.iter().enumerate() {
            picked = Some(Arc::clone(&entry.link));
            if ordinal == target {
                break;
            }
        }
        picked
    }

    fn draw(&self, count: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random_range(0..count)
    }

    /// Remove every connection, close it and wait for its ingestion task.
    ///
    /// Connections registered while this runs may survive it. When called
    /// from an ingestion task, that task is closed but not awaited.
    pub async fn close_all(&self) { self.close_all_except(task::try_id()).await; }

    /// [`Registry::close_all`], skipping the join of the task `caller`.
    ///
    /// Every entry is removed and cancelled before the first await, so the
    /// registry is empty even if the returned future is dropped early.
    pub(crate) async fn close_all_except(&self, caller: Option<task::Id>) {
        // Another caller may have removed some of them already.
        let entries: Vec<Entry> = self
            .ids()
            .into_iter()
            .filter_map(|id| self.conns.remove(&id).map(|(_, entry)| entry))
            .collect();
        for entry in &entries {
            crate::metrics::dec_connections();
            entry.link.cancel_token().cancel();
        }
        for entry in &entries {
            entry.link.close().await;
        }
        for entry in entries {
            entry.join(caller).await;
        }
    }
}
