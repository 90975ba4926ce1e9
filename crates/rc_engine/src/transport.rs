//! Outbound side of the relay connection.

use async_trait::async_trait;
use rc_proto::StreamPayload;
use tokio::sync::mpsc;

use crate::error::EngineError;

/// Sends one payload towards the relay. Implementations own framing and
/// connection handling.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: StreamPayload) -> Result<(), EngineError>;
}

/// In-process transport over a bounded `mpsc` channel. Used to wire two
/// engines together directly and to observe outbound traffic in tests.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<StreamPayload>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StreamPayload>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, payload: StreamPayload) -> Result<(), EngineError> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| EngineError::Transport("outbound channel closed".into()))
    }
}
