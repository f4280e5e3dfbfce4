//! Metric helpers for `switchboard`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. With the
//! `metrics` feature disabled every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking registered connections.
pub const CONNECTIONS_ACTIVE: &str = "switchboard_connections_active";
/// Name of the counter tracking bytes moved through the switchboard.
pub const BYTES_TOTAL: &str = "switchboard_bytes_total";
/// Name of the counter tracking transport failures.
pub const ERRORS_TOTAL: &str = "switchboard_errors_total";

/// Direction of traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Bytes decoded from a connection.
    Inbound,
    /// Bytes written to a connection.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the registered connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the registered connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record `bytes` moved in the given direction.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn add_bytes(direction: Direction, bytes: usize) {
    #[cfg(feature = "metrics")]
    counter!(BYTES_TOTAL, "direction" => direction.as_str())
        .increment(u64::try_from(bytes).unwrap_or(u64::MAX));
}

/// Record a transport failure.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}
