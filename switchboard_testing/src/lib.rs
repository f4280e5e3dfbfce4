//! Test doubles for exercising a [`Switchboard`](switchboard::Switchboard)
//! without real sockets.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use switchboard::Switchboard;
//! use switchboard_testing::{RecordingSession, mock_connection};
//!
//! # async fn example() {
//! let session = Arc::new(RecordingSession::new(1));
//! let switchboard = Switchboard::builder(session).build().unwrap();
//! let (conn, peer) = mock_connection();
//! switchboard.register(conn);
//! switchboard.send(b"hi", None).await.unwrap();
//! assert_eq!(peer.written(), b"hi");
//! # }
//! ```

pub mod logging;
pub mod macros;
pub mod mock_connection;
pub mod recording_session;

pub use logging::{LoggerHandle, logger};
pub use mock_connection::{MockConnection, MockPeer, mock_connection};
pub use recording_session::RecordingSession;
