//! Flow-control gate consumed by the switchboard.
//!
//! [`FlowControl`] is the interface the switchboard calls to admit byte
//! volumes in each direction and to meter what actually moved. [`Valve`] is
//! the bundled implementation: optional per-direction byte rate limits built
//! on [`leaky_bucket::RateLimiter`] plus running byte counters.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use leaky_bucket::RateLimiter;

use crate::error::ConfigError;

/// Highest supported byte rate, in bytes per second.
pub const MAX_RATE: usize = 1 << 30;

/// Admission and metering for traffic passing through a switchboard.
#[async_trait]
pub trait FlowControl: Send + Sync + 'static {
    /// Wait until `bytes` may be sent.
    async fn admit_outbound(&self, bytes: usize);

    /// Wait until `bytes` may be received.
    async fn admit_inbound(&self, bytes: usize);

    /// Record bytes written to a connection.
    fn record_tx(&self, bytes: usize);

    /// Record bytes decoded from a connection.
    fn record_rx(&self, bytes: usize);
}

/// Byte-rate limiter and counter pair for both directions.
///
/// # Examples
///
/// ```rust,no_run
/// use switchboard::{FlowControl, Valve};
///
/// # async fn demo() {
/// let valve = Valve::builder()
///     .tx_rate(Some(64 * 1024))
///     .build()
///     .expect("failed to build Valve");
/// valve.admit_outbound(512).await;
/// valve.record_tx(512);
/// assert_eq!(valve.tx_bytes(), 512);
/// # }
/// ```
#[derive(Default)]
pub struct Valve {
    rx_limiter: Option<Gate>,
    tx_limiter: Option<Gate>,
    rx: AtomicU64,
    tx: AtomicU64,
}

struct Gate {
    limiter: RateLimiter,
    burst: usize,
}

impl Gate {
    fn new(rate: usize) -> Self {
        let limiter = RateLimiter::builder()
            .initial(rate)
            .refill(rate)
            .interval(Duration::from_secs(1))
            .max(rate)
            .build();
        Self {
            limiter,
            burst: rate,
        }
    }

    /// Acquire `bytes` permits, at most one bucket at a time.
    async fn admit(&self, bytes: usize) {
        let mut remaining = bytes;
        while remaining > 0 {
            let take = remaining.min(self.burst);
            self.limiter.acquire(take).await;
            remaining -= take;
        }
    }
}

impl Valve {
    /// A valve that never delays admission.
    #[must_use]
    pub fn unlimited() -> Self { Self::default() }

    /// Start configuring a rate-limited valve.
    #[must_use]
    pub fn builder() -> ValveBuilder { ValveBuilder::default() }

    /// Total bytes received since creation or the last [`Valve::take_rx`].
    #[must_use]
    pub fn rx_bytes(&self) -> u64 { self.rx.load(Ordering::Relaxed) }

    /// Total bytes sent since creation or the last [`Valve::take_tx`].
    #[must_use]
    pub fn tx_bytes(&self) -> u64 { self.tx.load(Ordering::Relaxed) }

    /// Return the received byte count and reset it to zero.
    pub fn take_rx(&self) -> u64 { self.rx.swap(0, Ordering::Relaxed) }

    /// Return the sent byte count and reset it to zero.
    pub fn take_tx(&self) -> u64 { self.tx.swap(0, Ordering::Relaxed) }
}

impl std::fmt::Debug for Valve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Valve")
            .field("rx_rate", &self.rx_limiter.as_ref().map(|g| g.burst))
            .field("tx_rate", &self.tx_limiter.as_ref().map(|g| g.burst))
            .field("rx", &self.rx_bytes())
            .field("tx", &self.tx_bytes())
            .finish()
    }
}

#[async_trait]
impl FlowControl for Valve {
    async fn admit_outbound(&self, bytes: usize) {
        if let Some(gate) = &self.tx_limiter {
            gate.admit(bytes).await;
        }
    }

    async fn admit_inbound(&self, bytes: usize) {
        if let Some(gate) = &self.rx_limiter {
            gate.admit(bytes).await;
        }
    }

    fn record_tx(&self, bytes: usize) {
        self.tx
            .fetch_add(u64::try_from(bytes).unwrap_or(u64::MAX), Ordering::Relaxed);
        crate::metrics::add_bytes(crate::metrics::Direction::Outbound, bytes);
    }

    fn record_rx(&self, bytes: usize) {
        self.rx
            .fetch_add(u64::try_from(bytes).unwrap_or(u64::MAX), Ordering::Relaxed);
        crate::metrics::add_bytes(crate::metrics::Direction::Inbound, bytes);
    }
}

/// Builder for [`Valve`].
///
/// Both directions are unlimited unless a rate is set. Rates are expressed
/// in bytes per second and may burst up to one second's worth of traffic.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValveBuilder {
    rx_rate: Option<usize>,
    tx_rate: Option<usize>,
}

impl ValveBuilder {
    /// Limit inbound traffic to `rate` bytes per second. `None` disables it.
    #[must_use]
    pub fn rx_rate(mut self, rate: Option<usize>) -> Self {
        self.rx_rate = rate;
        self
    }

    /// Limit outbound traffic to `rate` bytes per second. `None` disables it.
    #[must_use]
    pub fn tx_rate(mut self, rate: Option<usize>) -> Self {
        self.tx_rate = rate;
        self
    }

    /// Build the configured [`Valve`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRate`] if either rate is zero or
    /// strictly greater than [`MAX_RATE`].
    pub fn build(self) -> Result<Valve, ConfigError> {
        Ok(Valve {
            rx_limiter: gate_for(self.rx_rate)?,
            tx_limiter: gate_for(self.tx_rate)?,
            ..Valve::default()
        })
    }
}

fn gate_for(rate: Option<usize>) -> Result<Option<Gate>, ConfigError> {
    match rate {
        Some(r) if r == 0 || r > MAX_RATE => Err(ConfigError::InvalidRate(r)),
        Some(r) => Ok(Some(Gate::new(r))),
        None => Ok(None),
    }
}
