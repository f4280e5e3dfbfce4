//! Builder for configuring a [`Switchboard`].

use std::sync::{Arc, atomic::AtomicBool};

use rand::{SeedableRng, rngs::StdRng};

use super::{Shared, Strategy, Switchboard};
use crate::{
    error::ConfigError,
    registry::Registry,
    session::Session,
    valve::{FlowControl, Valve},
};

/// Default capacity of each ingestion task's read buffer, in bytes.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 20_480;

/// Builder for [`Switchboard`].
///
/// Defaults: [`Strategy::FixedMapping`], an unlimited [`Valve`], an
/// OS-seeded random generator and [`DEFAULT_READ_BUFFER_SIZE`]. Construct
/// via [`Switchboard::builder`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use switchboard::{Session, Strategy, Switchboard, Valve};
///
/// # fn demo(session: Arc<dyn Session>) {
/// let valve = Valve::builder()
///     .tx_rate(Some(1 << 20))
///     .build()
///     .expect("failed to build Valve");
/// let _switchboard = Switchboard::builder(session)
///     .strategy(Strategy::UniformSpread)
///     .flow_control(Arc::new(valve))
///     .seed(42)
///     .build()
///     .expect("failed to build Switchboard");
/// # }
/// ```
pub struct SwitchboardBuilder {
    session: Arc<dyn Session>,
    strategy: Strategy,
    flow: Option<Arc<dyn FlowControl>>,
    rng: Option<StdRng>,
    read_buffer_size: usize,
}

impl SwitchboardBuilder {
    pub(super) fn new(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            strategy: Strategy::default(),
            flow: None,
            rng: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Select the outbound distribution strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Gate and meter traffic through `flow`.
    #[must_use]
    pub fn flow_control(mut self, flow: Arc<dyn FlowControl>) -> Self {
        self.flow = Some(flow);
        self
    }

    /// Draw random connection picks from `rng`.
    #[must_use]
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Draw random connection picks from a generator seeded with `seed`.
    #[must_use]
    pub fn seed(self, seed: u64) -> Self { self.rng(StdRng::seed_from_u64(seed)) }

    /// Set the capacity of each ingestion task's read buffer.
    #[must_use]
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Build the configured [`Switchboard`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBufferSize`] if the read buffer size is
    /// zero.
    pub fn build(self) -> Result<Switchboard, ConfigError> {
        if self.read_buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize(self.read_buffer_size));
        }
        let registry = match self.rng {
            Some(rng) => Registry::with_rng(rng),
            None => Registry::default(),
        };
        let flow = self
            .flow
            .unwrap_or_else(|| Arc::new(Valve::unlimited()) as Arc<dyn FlowControl>);
        Ok(Switchboard {
            shared: Arc::new(Shared {
                session: self.session,
                flow,
                strategy: self.strategy,
                registry,
                read_buffer_size: self.read_buffer_size,
                broken: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
            }),
        })
    }
}
