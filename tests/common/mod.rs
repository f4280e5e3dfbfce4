//! Shared utilities for integration tests.
//!
//! Provides a recording session fixture, a helper to build a switchboard
//! over a batch of mock connections, and a polling helper for conditions
//! reached by background ingestion tasks.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{sync::Arc, time::Duration};

use rstest::fixture;
use switchboard::{ConnectionId, Strategy, Switchboard};
use switchboard_testing::{MockPeer, RecordingSession, mock_connection};

/// Shared result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Seed used wherever a test needs reproducible random picks.
pub const SEED: u64 = 42;

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn session() -> Arc<RecordingSession> { Arc::new(RecordingSession::new(7)) }

/// Build a seeded switchboard owned by `session`.
///
/// # Panics
///
/// Panics if the default configuration is rejected.
#[expect(
    clippy::expect_used,
    reason = "a rejected default configuration must abort the test immediately"
)]
pub fn switchboard(session: &Arc<RecordingSession>, strategy: Strategy) -> Switchboard {
    Switchboard::builder(session.clone())
        .strategy(strategy)
        .seed(SEED)
        .build()
        .expect("failed to build Switchboard")
}

/// Register `count` mock connections, returning their ids and peers.
pub fn register_mocks(switchboard: &Switchboard, count: usize) -> Vec<(ConnectionId, MockPeer)> {
    (0..count)
        .map(|_| {
            let (conn, peer) = mock_connection();
            (switchboard.register(conn), peer)
        })
        .collect()
}

/// Poll `condition` until it holds or one second elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
