//! Multiplexing core tying a session to its pool of connections.
//!
//! [`Switchboard`] registers connections, spreads outbound data across them
//! according to a [`Strategy`], runs one ingestion task per connection and
//! breaks the whole session as soon as any single connection fails.

mod builder;
mod ingest;
mod teardown;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

pub use builder::{DEFAULT_READ_BUFFER_SIZE, SwitchboardBuilder};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::{
    connection::{Connection, ConnectionId, Link},
    error::SwitchboardError,
    registry::{Entry, Registry},
    session::Session,
    valve::FlowControl,
};

/// Outbound distribution strategy, fixed when the switchboard is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Keep each logical substream on the connection it is pinned to,
    /// re-pinning to a random connection when that one disappears.
    #[default]
    FixedMapping,
    /// Send every call to a connection chosen uniformly at random.
    UniformSpread,
}

/// Outcome of a successful [`Switchboard::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dispatched {
    /// Bytes written to the connection.
    pub written: usize,
    /// Connection the data went to. Under [`Strategy::FixedMapping`] this is
    /// the caller's pin for subsequent sends.
    pub connection_id: ConnectionId,
}

/// State shared between the switchboard handle and its ingestion tasks.
pub(crate) struct Shared {
    session: Arc<dyn Session>,
    flow: Arc<dyn FlowControl>,
    strategy: Strategy,
    registry: Registry,
    read_buffer_size: usize,
    broken: AtomicBool,
    torn_down: AtomicBool,
}

impl Shared {
    fn is_broken(&self) -> bool { self.broken.load(Ordering::Acquire) }

    /// Fail fast when broken or when nothing is registered.
    fn ensure_usable(&self) -> Result<(), SwitchboardError> {
        if self.is_broken() || self.registry.is_empty() {
            return Err(SwitchboardError::Broken);
        }
        Ok(())
    }

    fn pick_random(&self) -> Result<Arc<Link>, SwitchboardError> {
        self.ensure_usable()?;
        self.registry.pick().ok_or(SwitchboardError::Broken)
    }

    async fn write_to(&self, link: &Link, data: &[u8]) -> Result<Dispatched, SwitchboardError> {
        match link.write(data).await {
            Ok(written) => {
                self.flow.record_tx(written);
                Ok(Dispatched {
                    written,
                    connection_id: link.id(),
                })
            }
            Err(e) => {
                crate::metrics::inc_errors();
                self.break_with(&format!("failed to write to remote: {e}"));
                Err(SwitchboardError::Write(e))
            }
        }
    }
}

/// Cloneable handle to a session's connection pool.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use switchboard::{Session, Strategy, Switchboard, Valve};
///
/// # async fn demo(session: Arc<dyn Session>, stream: tokio::io::DuplexStream) {
/// let switchboard = Switchboard::builder(session)
///     .strategy(Strategy::UniformSpread)
///     .flow_control(Arc::new(Valve::unlimited()))
///     .build()
///     .expect("failed to build Switchboard");
/// switchboard.register(stream);
/// let sent = switchboard.send(b"ping", None).await.expect("send failed");
/// assert_eq!(sent.written, 4);
/// switchboard.close_all().await;
/// # }
/// ```
#[derive(Clone)]
pub struct Switchboard {
    shared: Arc<Shared>,
}

impl Switchboard {
    /// Start configuring a switchboard owned by `session`.
    #[must_use]
    pub fn builder(session: Arc<dyn Session>) -> SwitchboardBuilder {
        SwitchboardBuilder::new(session)
    }

    /// Strategy selected at construction.
    #[must_use]
    pub fn strategy(&self) -> Strategy { self.shared.strategy }

    /// Returns `true` once any connection has failed or
    /// [`Switchboard::break_with`] has been called.
    #[must_use]
    pub fn is_broken(&self) -> bool { self.shared.is_broken() }

    /// Number of registered connections. Intended for monitoring.
    #[must_use]
    pub fn count(&self) -> usize { self.shared.registry.count() }

    /// Start managing `conn` and spawn its ingestion task.
    ///
    /// Does not wait; safe to call from several tasks at once.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn register<C: Connection>(&self, conn: C) -> ConnectionId {
        let registry = &self.shared.registry;
        let id = registry.next_id();
        let (link, reader) = Link::split(id, Box::new(conn), CancellationToken::new());
        let link = Arc::new(link);
        let task = tokio::spawn(ingest::run(
            Arc::clone(&self.shared),
            Arc::clone(&link),
            reader,
        ));
        registry.insert(id, Entry::new(link, task));
        info!(
            "connection registered: session={}, id={id}, connections={}",
            self.shared.session.id(),
            registry.count()
        );
        id
    }

    /// Fetch the link registered under `id`.
    #[must_use]
    pub fn lookup(&self, id: ConnectionId) -> Option<Arc<Link>> { self.shared.registry.lookup(id) }

    /// Pick a registered connection at random.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchboardError::Broken`] if the switchboard is broken or
    /// has no connections.
    pub fn pick_random(&self) -> Result<Arc<Link>, SwitchboardError> { self.shared.pick_random() }

    /// Send `data` over one connection.
    ///
    /// Waits for the outbound flow-control gate first. Under
    /// [`Strategy::FixedMapping`] the data goes to `pin` if it is still
    /// registered, otherwise to a random replacement whose id is returned in
    /// [`Dispatched::connection_id`]. Under [`Strategy::UniformSpread`] `pin`
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchboardError::Broken`] without writing if the switchboard
    /// is broken or empty, and [`SwitchboardError::Write`] if the write
    /// fails. A failed write breaks the switchboard and tears down the
    /// session.
    pub async fn send(
        &self,
        data: &[u8],
        pin: Option<ConnectionId>,
    ) -> Result<Dispatched, SwitchboardError> {
        let shared = &self.shared;
        shared.flow.admit_outbound(data.len()).await;
        // Re-checked after the gate: state may have changed while waiting.
        shared.ensure_usable()?;

        let link = match shared.strategy {
            Strategy::UniformSpread => shared.pick_random()?,
            Strategy::FixedMapping => {
                match pin.and_then(|id| shared.registry.lookup(id)) {
                    Some(link) => link,
                    None => {
                        let link = shared.pick_random()?;
                        debug!("substream re-pinned: from={pin:?}, to={}", link.id());
                        link
                    }
                }
            }
        };
        shared.write_to(&link, data).await
    }

    /// Mark the switchboard broken and tear down the owning session.
    ///
    /// The session receives `reason` as its terminal message unless it is
    /// already closed. Repeated calls only keep the switchboard broken.
    pub fn break_with(&self, reason: &str) { self.shared.break_with(reason); }

    /// Close every registered connection and wait for its ingestion task.
    ///
    /// Does not itself mark the switchboard broken, although the closed
    /// connections' ingestion tasks report their shutdown as failures.
    ///
    /// May be called from [`Session::deliver`]: the closing runs on its own
    /// task, which skips joining the calling ingestion task and completes
    /// even though cancelling that connection drops the caller's future.
    pub async fn close_all(&self) {
        let shared = Arc::clone(&self.shared);
        let caller = tokio::task::try_id();
        let closing =
            tokio::spawn(async move { shared.registry.close_all_except(caller).await });
        if let Err(e) = closing.await {
            debug!(
                "closing connections failed: session={}, error={e}",
                self.shared.session.id()
            );
        }
    }
}
