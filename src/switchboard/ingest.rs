//! Per-connection ingestion loop.
//!
//! Each registered connection gets one task that decodes reads through the
//! session, passes them through the inbound gate and hands the payload up.
//! Only a failed read ends the loop; a failed delivery is logged and
//! reading continues.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use bytes::Bytes;
use futures::FutureExt;
use log::{debug, error};

use super::Shared;
use crate::connection::{ConnectionReader, Link, aborted};

/// Terminal message recorded when a read fails.
pub(crate) const CONNECTION_DROPPED: &str = "a connection has dropped unexpectedly";

/// Drive the ingestion loop for `link`, treating a panic as a read failure.
pub(super) async fn run(shared: Arc<Shared>, link: Arc<Link>, reader: ConnectionReader) {
    let fut = AssertUnwindSafe(ingest(&shared, &link, reader)).catch_unwind();
    if let Err(panic) = fut.await {
        let panic_msg = panic_message(panic.as_ref());
        tracing::error!(
            panic = %panic_msg,
            session = shared.session.id(),
            connection_id = %link.id(),
            "ingestion task panicked"
        );
        close_in_background(&link);
        shared.break_with(CONNECTION_DROPPED);
    }
}

async fn ingest(shared: &Shared, link: &Arc<Link>, mut reader: ConnectionReader) {
    let cancel = link.cancel_token().clone();
    let mut buf = vec![0u8; shared.read_buffer_size];
    loop {
        let res = tokio::select! {
            biased;

            () = cancel.cancelled() => Err(aborted()),
            res = shared.session.decode_read(&mut reader, &mut buf) => res,
        };
        let res = match res {
            Ok(n) => {
                let n = n.min(buf.len());
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => Err(aborted()),
                    () = shared.flow.admit_inbound(n) => {
                        shared.flow.record_rx(n);
                        Ok(n)
                    }
                }
            }
            Err(e) => Err(e),
        };

        let n = match res {
            Ok(n) => n,
            Err(e) => {
                debug!(
                    "a connection for session {} has closed: id={}, error={e}",
                    shared.session.id(),
                    link.id()
                );
                if !cancel.is_cancelled() {
                    crate::metrics::inc_errors();
                }
                close_in_background(link);
                shared.break_with(CONNECTION_DROPPED);
                return;
            }
        };

        let data = Bytes::copy_from_slice(&buf[..n]);
        tokio::select! {
            biased;

            // Reported as a read failure on the next iteration.
            () = cancel.cancelled() => {}
            res = shared.session.deliver(data) => {
                if let Err(e) = res {
                    error!(
                        "failed to deliver inbound data: session={}, id={}, error={e}",
                        shared.session.id(),
                        link.id()
                    );
                }
            }
        }
    }
}

fn close_in_background(link: &Arc<Link>) {
    let link = Arc::clone(link);
    tokio::spawn(async move { link.close().await });
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
