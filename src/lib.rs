#![doc(html_root_url = "https://docs.rs/switchboard/latest")]
//! Public API for the `switchboard` library.
//!
//! This crate spreads one logical session stream across a dynamic pool of
//! duplex transport connections. It provides the connection registry, two
//! outbound dispatch strategies, a per-connection ingestion loop and the
//! fail-fast teardown path that ties every connection's health to the
//! owning session.

pub mod connection;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod switchboard;
pub mod valve;

pub use connection::{Connection, ConnectionId, ConnectionReader};
pub use error::{ConfigError, SwitchboardError};
pub use metrics::{BYTES_TOTAL, CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL};
pub use session::{BoxError, Session};
pub use switchboard::{
    DEFAULT_READ_BUFFER_SIZE,
    Dispatched,
    Strategy,
    Switchboard,
    SwitchboardBuilder,
};
pub use valve::{FlowControl, MAX_RATE, Valve, ValveBuilder};
