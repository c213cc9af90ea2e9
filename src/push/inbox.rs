//! Per-client inbox: a multi-producer, single-consumer FIFO of outbound
//! payloads with a wake sentinel.
//!
//! Payloads are [`Bytes`], so fanning one broadcast out to many inboxes
//! clones a reference count rather than the body. The sentinel carries no
//! data; popping it means "return to the browser with an empty body right
//! now". It is pushed on disconnect and on flush so that a parked receive
//! unblocks promptly.

use bytes::Bytes;
use tokio::sync::mpsc;

/// One element of a client's inbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum InboxItem {
    /// A JSON message body to hand to the browser verbatim.
    Payload(Bytes),
    /// Return immediately with no data.
    Wake,
}

/// Producer half, cheap to clone. Enqueueing never blocks.
#[derive(Clone, Debug)]
pub(crate) struct InboxSender {
    tx: mpsc::UnboundedSender<InboxItem>,
}

impl InboxSender {
    /// Append a payload. Returns false if the consumer half is gone.
    pub(crate) fn push(&self, payload: Bytes) -> bool {
        self.tx.send(InboxItem::Payload(payload)).is_ok()
    }

    /// Append a wake sentinel.
    pub(crate) fn wake(&self) {
        let _ = self.tx.send(InboxItem::Wake);
    }
}

/// Consumer half; exactly one per client, guarded by the receive mutex.
#[derive(Debug)]
pub(crate) struct InboxReceiver {
    rx: mpsc::UnboundedReceiver<InboxItem>,
}

impl InboxReceiver {
    /// Wait for the next item. `None` only after every sender is dropped.
    pub(crate) async fn recv(&mut self) -> Option<InboxItem> {
        self.rx.recv().await
    }
}

/// Create a connected inbox pair.
pub(crate) fn inbox() -> (InboxSender, InboxReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxSender { tx }, InboxReceiver { rx })
}
