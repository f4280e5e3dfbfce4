//! Tests for failure propagation and one-shot session teardown.

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use log::Level;
use rstest::rstest;
use serial_test::serial;
use switchboard::{BoxError, ConnectionReader, Session, Strategy, Switchboard, SwitchboardError};
use switchboard_testing::{LoggerHandle, RecordingSession, logger, mock_connection};
use tokio::io::AsyncReadExt;

mod common;
use common::{TestResult, eventually, register_mocks, session, switchboard};

const DROPPED: &str = "a connection has dropped unexpectedly";

/// A failed write breaks the switchboard and tears the session down.
#[rstest]
#[tokio::test]
async fn write_failure_breaks_switchboard(session: Arc<RecordingSession>) -> TestResult {
    let sb = switchboard(&session, Strategy::FixedMapping);
    let peers = register_mocks(&sb, 2);
    let (id, peer) = &peers[0];
    peer.fail_writes();

    let err = sb
        .send(b"doomed", Some(*id))
        .await
        .expect_err("write should fail");
    assert!(matches!(err, SwitchboardError::Write(ref e) if e.kind() == io::ErrorKind::BrokenPipe));

    assert!(sb.is_broken());
    assert_eq!(session.passive_closes(), 1);
    let messages = session.terminal_messages();
    assert_eq!(messages.len(), 1);
    assert!(
        messages[0].starts_with("failed to write to remote: "),
        "unexpected terminal message: {}",
        messages[0]
    );

    // The healthy connection is no longer reachable through dispatch.
    let healthy = peers[1].0;
    assert!(sb.send(b"after", Some(healthy)).await.is_err_and(|e| e.is_broken()));
    assert_eq!(peers[1].1.writes(), 0);
    Ok(())
}

/// Concurrent write failures tear the session down exactly once.
#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_write_failures_tear_down_once(session: Arc<RecordingSession>) -> TestResult {
    let sb = switchboard(&session, Strategy::UniformSpread);
    let peers = register_mocks(&sb, 4);
    for (_, peer) in &peers {
        peer.fail_writes();
    }

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let sb = sb.clone();
        tasks.push(tokio::spawn(async move { sb.send(b"x", None).await }));
    }
    for task in tasks {
        assert!(task.await?.is_err());
    }

    assert!(sb.is_broken());
    assert_eq!(session.passive_closes(), 1);
    assert_eq!(session.terminal_messages().len(), 1);
    Ok(())
}

/// Session that never reports itself closed, so only the switchboard's own
/// latch keeps teardown one-shot. Optionally panics while decoding.
#[derive(Default)]
struct StubbornSession {
    messages: Mutex<Vec<String>>,
    closes: AtomicUsize,
    panic_on_read: bool,
}

impl StubbornSession {
    fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Session for StubbornSession {
    fn id(&self) -> u32 { 99 }

    fn is_closed(&self) -> bool { false }

    fn set_terminal_message(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_owned());
    }

    fn request_passive_close(&self) { self.closes.fetch_add(1, Ordering::AcqRel); }

    async fn decode_read(
        &self,
        reader: &mut ConnectionReader,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        assert!(!self.panic_on_read, "decoder exploded");
        match reader.read(buf).await? {
            0 => Err(io::ErrorKind::UnexpectedEof.into()),
            n => Ok(n),
        }
    }

    async fn deliver(&self, _data: Bytes) -> Result<(), BoxError> { Ok(()) }
}

/// Racing failure signals reach the session only once.
#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_failures_are_signalled_once() -> TestResult {
    let session = Arc::new(StubbornSession::default());
    let sb = Switchboard::builder(session.clone()).build()?;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let sb = sb.clone();
        tasks.push(tokio::spawn(async move {
            sb.break_with(&format!("failure {i}"));
        }));
    }
    for task in tasks {
        task.await?;
    }

    assert!(sb.is_broken());
    assert_eq!(session.closes.load(Ordering::Acquire), 1);
    assert_eq!(session.messages().len(), 1);
    Ok(())
}

/// A panicking decoder is treated as a dropped connection.
#[rstest]
#[tokio::test]
#[serial(switchboard_logs)]
async fn decoder_panic_breaks_switchboard(mut logger: LoggerHandle) -> TestResult {
    let session = Arc::new(StubbornSession {
        panic_on_read: true,
        ..StubbornSession::default()
    });
    let sb = Switchboard::builder(session.clone()).build()?;
    let (conn, peer) = mock_connection();
    sb.register(conn);

    assert!(eventually(|| sb.is_broken()).await, "panic did not break the switchboard");
    assert_eq!(session.messages(), [DROPPED]);
    assert_eq!(session.closes.load(Ordering::Acquire), 1);
    assert!(eventually(|| peer.shutdowns() == 1).await);
    assert!(
        logger
            .find(Level::Error, "ingestion task panicked")
            .is_some(),
        "panic was not logged"
    );
    Ok(())
}

/// A session that is already closed is not given a terminal message.
#[rstest]
#[tokio::test]
async fn closed_session_is_left_alone(session: Arc<RecordingSession>) {
    let sb = switchboard(&session, Strategy::FixedMapping);
    session.request_passive_close();

    sb.break_with("late failure");

    assert!(sb.is_broken());
    assert!(session.terminal_messages().is_empty());
    assert_eq!(session.passive_closes(), 1);
}

/// Severing one of three connections breaks the whole switchboard.
#[rstest]
#[tokio::test]
async fn severed_connection_breaks_switchboard(session: Arc<RecordingSession>) -> TestResult {
    let sb = switchboard(&session, Strategy::UniformSpread);
    let mut peers = register_mocks(&sb, 3);

    peers[1].1.sever();
    session.wait_closed().await;

    assert!(sb.is_broken());
    assert_eq!(session.terminal_messages(), [DROPPED]);
    assert_eq!(session.passive_closes(), 1);

    let err = sb
        .send(b"payload", None)
        .await
        .expect_err("send should fail once broken");
    assert!(err.is_broken());
    assert!(peers.iter().all(|(_, peer)| peer.writes() == 0));
    Ok(())
}

/// A read failure closes only the failing connection; the others keep
/// reading until they are closed themselves.
#[rstest]
#[tokio::test]
async fn read_failure_closes_only_its_connection(session: Arc<RecordingSession>) -> TestResult {
    let sb = switchboard(&session, Strategy::FixedMapping);
    let (healthy_conn, mut healthy) = mock_connection();
    let (failing_conn, mut failing) = mock_connection();
    let healthy_id = sb.register(healthy_conn);
    let failing_id = sb.register(failing_conn);

    failing.sever();
    session.wait_closed().await;
    assert!(eventually(|| failing.shutdowns() == 1).await);
    assert_eq!(healthy.shutdowns(), 0);

    // The failed entry stays registered until the bulk close.
    assert_eq!(sb.count(), 2);
    let failed_link = sb.lookup(failing_id).ok_or("failed link missing")?;
    assert!(failed_link.is_closed());
    let healthy_link = sb.lookup(healthy_id).ok_or("healthy link missing")?;
    assert!(!healthy_link.is_closed());

    healthy.feed(b"late data").await?;
    let delivered = session.next_delivery().await.ok_or("delivery channel closed")?;
    assert_eq!(&delivered[..], b"late data");

    sb.close_all().await;
    assert_eq!(sb.count(), 0);
    assert_eq!(healthy.shutdowns(), 1);
    assert_eq!(failing.shutdowns(), 1);
    Ok(())
}
