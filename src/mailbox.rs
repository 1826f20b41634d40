//! FrameMailbox - single-slot hand-off with a bounded acceptance window
//!
//! ## Responsibilities
//!
//! - Decouple a producer loop from its consumer without unbounded buffering
//! - Drop values the consumer does not accept within the window
//!
//! The window policy lives here so it can be tested in isolation from
//! networking: `offer` returns `false` when the value was dropped.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

/// Create a connected mailbox pair.
pub fn mailbox<T>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (MailboxSender { tx }, MailboxReceiver { rx })
}

/// Producer half of a mailbox.
#[derive(Clone)]
pub struct MailboxSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> MailboxSender<T> {
    /// Offer a value, waiting at most `window` for the consumer to accept it.
    ///
    /// Returns `false` if the window expired or the consumer is gone; the
    /// value is dropped in both cases.
    pub async fn offer(&self, value: T, window: Duration) -> bool {
        match self.tx.send_timeout(value, window).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Closed(_)) => false,
        }
    }

    /// True once the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of a mailbox.
pub struct MailboxReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> MailboxReceiver<T> {
    /// Receive the next value; `None` once all senders are gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}
