//! Error types for switchboard operations and configuration.

use std::io;

use thiserror::Error;

use crate::valve::MAX_RATE;

/// Errors returned by [`crate::Switchboard::send`] and
/// [`crate::Switchboard::pick_random`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// No usable connection remains, or the switchboard has already been
    /// marked broken. Not retryable at this layer.
    #[error("the switchboard is broken")]
    Broken,
    /// Writing to the selected connection failed. The switchboard is broken
    /// by the time this is returned.
    #[error("failed to write to remote: {0}")]
    Write(#[source] io::Error),
}

impl SwitchboardError {
    /// Returns `true` for [`SwitchboardError::Broken`].
    #[must_use]
    pub fn is_broken(&self) -> bool { matches!(self, Self::Broken) }
}

/// Errors returned when building a [`crate::Switchboard`] or a
/// [`crate::Valve`].
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A byte rate was zero or exceeded [`MAX_RATE`].
    #[error("invalid rate {0}; must be between 1 and {max}", max = MAX_RATE)]
    InvalidRate(usize),
    /// The ingestion read buffer was configured with zero capacity.
    #[error("invalid read buffer size {0}; must be >= 1")]
    InvalidBufferSize(usize),
}
