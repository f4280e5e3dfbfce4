//! In-memory connection with an observable write side.
//!
//! [`mock_connection`] returns a [`MockConnection`] to hand to a switchboard
//! and a [`MockPeer`] that plays the remote end: it feeds inbound bytes,
//! severs the stream, and inspects what the switchboard wrote.

use std::{
    io,
    pin::Pin,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, duplex};

/// Capacity of the inbound pipe.
const INBOUND_CAPACITY: usize = 64 * 1024;

#[derive(Default)]
struct WriteLog {
    written: Mutex<Vec<u8>>,
    writes: AtomicUsize,
    shutdowns: AtomicUsize,
    fail_writes: AtomicBool,
}

/// Connection side handed to the switchboard.
///
/// Reads come from the paired [`MockPeer`]. Writes are recorded rather than
/// transmitted, so they never block.
pub struct MockConnection {
    inbound: DuplexStream,
    log: Arc<WriteLog>,
}

/// Remote end of a [`MockConnection`].
pub struct MockPeer {
    inbound: Option<DuplexStream>,
    log: Arc<WriteLog>,
}

/// Create a connected [`MockConnection`] and [`MockPeer`].
#[must_use]
pub fn mock_connection() -> (MockConnection, MockPeer) {
    let (local, remote) = duplex(INBOUND_CAPACITY);
    let log = Arc::new(WriteLog::default());
    (
        MockConnection {
            inbound: local,
            log: Arc::clone(&log),
        },
        MockPeer {
            inbound: Some(remote),
            log,
        },
    )
}

impl MockPeer {
    /// Send `data` to the connection's reader.
    ///
    /// # Errors
    ///
    /// Fails with [`io::ErrorKind::NotConnected`] after [`MockPeer::sever`],
    /// or with the pipe's error if the connection side was dropped.
    pub async fn feed(&mut self, data: &[u8]) -> io::Result<()> {
        let inbound = self
            .inbound
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        inbound.write_all(data).await
    }

    /// Drop the remote end; the connection's next read sees end of stream.
    pub fn sever(&mut self) { self.inbound = None; }

    /// Make every subsequent write fail with [`io::ErrorKind::BrokenPipe`].
    pub fn fail_writes(&self) { self.log.fail_writes.store(true, Ordering::Release); }

    /// Bytes written so far, concatenated.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.log
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful write calls.
    #[must_use]
    pub fn writes(&self) -> usize { self.log.writes.load(Ordering::Acquire) }

    /// Number of times the write side was shut down.
    #[must_use]
    pub fn shutdowns(&self) -> usize { self.log.shutdowns.load(Ordering::Acquire) }
}

impl AsyncRead for MockConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inbound).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.log.fail_writes.load(Ordering::Acquire) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        self.log
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        self.log.writes.fetch_add(1, Ordering::AcqRel);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.log.shutdowns.fetch_add(1, Ordering::AcqRel);
        Poll::Ready(Ok(()))
    }
}
