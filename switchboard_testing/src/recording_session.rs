//! Session double that records everything a switchboard tells it.

use std::{
    io,
    sync::{
        Mutex,
        PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use switchboard::{BoxError, ConnectionReader, Session};
use tokio::{
    io::AsyncReadExt,
    sync::{mpsc, watch},
};

/// [`Session`] that decodes reads verbatim and records teardown requests.
///
/// End of stream on a connection is reported as
/// [`io::ErrorKind::UnexpectedEof`]. Delivered payloads are queued for
/// [`RecordingSession::next_delivery`].
pub struct RecordingSession {
    id: u32,
    closed: watch::Sender<bool>,
    terminal_messages: Mutex<Vec<String>>,
    passive_closes: AtomicUsize,
    reject_deliveries: AtomicBool,
    delivered_tx: mpsc::UnboundedSender<Bytes>,
    delivered_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl RecordingSession {
    /// Create an open session with the given diagnostic id.
    #[must_use]
    pub fn new(id: u32) -> Self {
        let (closed, _) = watch::channel(false);
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
        Self {
            id,
            closed,
            terminal_messages: Mutex::new(Vec::new()),
            passive_closes: AtomicUsize::new(0),
            reject_deliveries: AtomicBool::new(false),
            delivered_tx,
            delivered_rx: tokio::sync::Mutex::new(delivered_rx),
        }
    }

    /// Make every subsequent delivery fail.
    pub fn reject_deliveries(&self) { self.reject_deliveries.store(true, Ordering::Release); }

    /// Terminal messages recorded so far, oldest first.
    #[must_use]
    pub fn terminal_messages(&self) -> Vec<String> {
        self.terminal_messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of passive close requests received.
    #[must_use]
    pub fn passive_closes(&self) -> usize { self.passive_closes.load(Ordering::Acquire) }

    /// Wait until the session has been asked to close.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Wait for the next payload delivered by the switchboard.
    pub async fn next_delivery(&self) -> Option<Bytes> { self.delivered_rx.lock().await.recv().await }
}

#[async_trait]
impl Session for RecordingSession {
    fn id(&self) -> u32 { self.id }

    fn is_closed(&self) -> bool { *self.closed.borrow() }

    fn set_terminal_message(&self, message: &str) {
        self.terminal_messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_owned());
    }

    fn request_passive_close(&self) {
        self.passive_closes.fetch_add(1, Ordering::AcqRel);
        self.closed.send_replace(true);
    }

    async fn decode_read(
        &self,
        reader: &mut ConnectionReader,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        match reader.read(buf).await? {
            0 => Err(io::ErrorKind::UnexpectedEof.into()),
            n => Ok(n),
        }
    }

    async fn deliver(&self, data: Bytes) -> Result<(), BoxError> {
        if self.reject_deliveries.load(Ordering::Acquire) {
            return Err("delivery rejected".into());
        }
        self.delivered_tx.send(data)?;
        Ok(())
    }
}
