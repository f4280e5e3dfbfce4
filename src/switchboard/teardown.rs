//! Broken-state transition and one-shot session teardown.

use std::sync::atomic::Ordering;

use log::warn;

use super::Shared;

impl Shared {
    /// Enter the broken state and, once, ask the session to close.
    ///
    /// The broken flag is set on every call. The session is only told about
    /// the first failure, and only if it has not closed already.
    pub(crate) fn break_with(&self, reason: &str) {
        self.broken.store(true, Ordering::Release);
        if self.session.is_closed() || self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(
            "switchboard broken: session={}, reason={reason}",
            self.session.id()
        );
        self.session.set_terminal_message(reason);
        self.session.request_passive_close();
    }
}
