//! Bounded per-kind queue between the demultiplexer and a worker pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rc_proto::{PayloadKind, StreamPayload};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

pub type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<StreamPayload>>>;

pub struct Mailbox {
    kind: PayloadKind,
    tx: mpsc::Sender<StreamPayload>,
    rx: SharedReceiver,
    dropped: AtomicU64,
}

impl Mailbox {
    pub fn new(kind: PayloadKind, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            kind,
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// Enqueue without waiting. On a full (or closed) mailbox the payload is
    /// handed back and the drop counter goes up.
    pub fn try_push(&self, payload: StreamPayload) -> Result<(), StreamPayload> {
        self.tx.try_send(payload).map_err(|err| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match err {
                mpsc::error::TrySendError::Full(p) | mpsc::error::TrySendError::Closed(p) => p,
            }
        })
    }

    /// Payloads enqueued but not yet taken by a worker.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Receiver shared by every worker of this mailbox's pool.
    pub fn receiver(&self) -> SharedReceiver {
        self.rx.clone()
    }
}
