#![cfg(feature = "metrics")]
//! Tests for `switchboard` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use switchboard::{FlowControl, Valve, metrics};

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn bytes_for(snapshotter: &Snapshotter, direction: &str) -> Option<u64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| {
            let matches = key.key().name() == metrics::BYTES_TOTAL
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == "direction" && l.value() == direction);
            match value {
                DebugValue::Counter(c) if matches => Some(c),
                _ => None,
            }
        })
}

#[rstest]
#[case(metrics::Direction::Inbound, "inbound")]
#[case(metrics::Direction::Outbound, "outbound")]
fn bytes_are_counted_per_direction(#[case] direction: metrics::Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::add_bytes(direction, 100);
        metrics::add_bytes(direction, 28);
    });

    assert_eq!(bytes_for(&snapshotter, label), Some(128));
}

#[test]
fn valve_records_traffic() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let valve = Valve::unlimited();
    ::metrics::with_local_recorder(&recorder, || {
        valve.record_tx(10);
        valve.record_rx(3);
    });

    assert_eq!(bytes_for(&snapshotter, "outbound"), Some(10));
    assert_eq!(bytes_for(&snapshotter, "inbound"), Some(3));
}

#[rstest]
#[case(1)]
#[case(3)]
fn error_metric_counts(#[case] expected: u64) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| metrics::inc_errors());
    });

    let metrics = snapshotter.snapshot().into_vec();
    assert!(
        metrics.iter().any(|(key, _, _, value)| {
            key.key().name() == metrics::ERRORS_TOTAL
                && matches!(value, DebugValue::Counter(c) if *c == expected)
        }),
        "expected {} == {expected}, got {metrics:#?}",
        metrics::ERRORS_TOTAL
    );
}

#[test]
fn connection_gauge_tracks_registrations() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_connections();
        metrics::inc_connections();
        metrics::dec_connections();
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(key, _, _, value)| {
        key.key().name() == metrics::CONNECTIONS_ACTIVE
            && matches!(value, DebugValue::Gauge(g) if (g.into_inner() - 1.0).abs() < f64::EPSILON)
    });
    assert!(found, "connection gauge not recorded: {metrics:#?}");
}
