//! Connection identifiers and the shared write side of a registered
//! connection.
//!
//! A registered connection is split in two. The read half is owned by the
//! connection's ingestion task; the write half lives in a [`Link`] shared
//! between the registry and dispatch. Closing a link cancels its token,
//! which interrupts any pending read or write on either half.

use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
};

use log::debug;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

/// Duplex byte stream that can be managed by a [`crate::Switchboard`].
///
/// Any `AsyncRead + AsyncWrite` type that is `Send`, `Unpin` and `'static`
/// qualifies, such as `tokio::net::TcpStream` or `tokio::io::DuplexStream`.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Read half handed to [`crate::Session::decode_read`].
pub type ConnectionReader = ReadHalf<Box<dyn Connection>>;

type ConnectionWriter = WriteHalf<Box<dyn Connection>>;

/// Identifier assigned to a registered connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Write half of a registered connection plus its close state.
pub struct Link {
    id: ConnectionId,
    writer: Mutex<ConnectionWriter>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Link {
    /// Split `conn` and return the link alongside the read half.
    pub(crate) fn split(
        id: ConnectionId,
        conn: Box<dyn Connection>,
        cancel: CancellationToken,
    ) -> (Self, ConnectionReader) {
        let (reader, writer) = tokio::io::split(conn);
        let link = Self {
            id,
            writer: Mutex::new(writer),
            cancel,
            closed: AtomicBool::new(false),
        };
        (link, reader)
    }

    /// Identifier of the connection behind this link.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Returns `true` once [`Link::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    /// Token cancelled when the link closes.
    pub(crate) fn cancel_token(&self) -> &CancellationToken { &self.cancel }

    /// Write the whole of `data` to the connection.
    ///
    /// A concurrent [`Link::close`] aborts the write with
    /// [`io::ErrorKind::ConnectionAborted`].
    ///
    /// # Errors
    ///
    /// Returns the transport error, or `ConnectionAborted` if the link was
    /// closed before or during the write.
    pub(crate) async fn write(&self, data: &[u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(aborted());
        }
        tokio::select! {
            biased;

            () = self.cancel.cancelled() => Err(aborted()),
            res = async {
                let mut writer = self.writer.lock().await;
                writer.write_all(data).await?;
                writer.flush().await
            } => res.map(|()| data.len()),
        }
    }

    /// Close the connection: cancel pending I/O and shut down the write half.
    ///
    /// Only the first call has any effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("connection shutdown failed: id={}, error={e}", self.id);
        }
    }
}

/// Error reported for I/O on a closed link.
pub(crate) fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed locally")
}
