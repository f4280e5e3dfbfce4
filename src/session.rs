//! Interface the switchboard consumes from its owning session.
//!
//! The session owns protocol framing, encryption and stream-level
//! multiplexing. The switchboard only asks it to decode reads, accept
//! decoded payloads and record a terminal failure.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;

use crate::connection::ConnectionReader;

/// Boxed error returned by [`Session::deliver`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Owning session of a [`crate::Switchboard`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::{
///     io,
///     sync::atomic::{AtomicBool, Ordering},
/// };
///
/// use async_trait::async_trait;
/// use bytes::Bytes;
/// use switchboard::{BoxError, ConnectionReader, Session};
/// use tokio::io::AsyncReadExt;
///
/// struct Passthrough {
///     closed: AtomicBool,
/// }
///
/// #[async_trait]
/// impl Session for Passthrough {
///     fn id(&self) -> u32 { 1 }
///
///     fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }
///
///     fn set_terminal_message(&self, message: &str) { eprintln!("{message}"); }
///
///     fn request_passive_close(&self) { self.closed.store(true, Ordering::Release); }
///
///     async fn decode_read(
///         &self,
///         reader: &mut ConnectionReader,
///         buf: &mut [u8],
///     ) -> io::Result<usize> {
///         match reader.read(buf).await? {
///             0 => Err(io::ErrorKind::UnexpectedEof.into()),
///             n => Ok(n),
///         }
///     }
///
///     async fn deliver(&self, _data: Bytes) -> Result<(), BoxError> { Ok(()) }
/// }
/// ```
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Identifier used for diagnostics only.
    fn id(&self) -> u32;

    /// Returns `true` once the session has been closed.
    fn is_closed(&self) -> bool;

    /// Record the message describing why the session is being torn down.
    fn set_terminal_message(&self, message: &str);

    /// Ask the session to close itself. Must be idempotent.
    fn request_passive_close(&self);

    /// Read and decode one unit from `reader` into `buf`.
    ///
    /// Returns the number of decoded application bytes written to `buf`.
    /// The implementation may consume more raw bytes than it reports and may
    /// return `Ok(0)` for units carrying no payload. End of stream must be
    /// reported as an error.
    ///
    /// # Errors
    ///
    /// Any error is treated as fatal for the connection and the session.
    async fn decode_read(&self, reader: &mut ConnectionReader, buf: &mut [u8])
    -> io::Result<usize>;

    /// Hand decoded bytes to the session.
    ///
    /// # Errors
    ///
    /// Errors are logged by the switchboard and never break the connection.
    async fn deliver(&self, data: Bytes) -> Result<(), BoxError>;
}
