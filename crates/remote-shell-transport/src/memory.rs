//! In-process duplex channel.

use async_trait::async_trait;
use remote_shell_core::Message;
use tokio::sync::mpsc;

use crate::channel::{MessageSink, MessageSource, TransportError};

/// Create a connected pair of endpoints.
///
/// Whatever one endpoint sends, the other receives, in order.
#[must_use]
pub fn duplex() -> (Endpoint, Endpoint) {
    let (left_tx, left_rx) = mpsc::unbounded_channel();
    let (right_tx, right_rx) = mpsc::unbounded_channel();

    let left = Endpoint {
        sink: MemorySink { tx: right_tx },
        source: MemorySource { rx: left_rx },
    };
    let right = Endpoint {
        sink: MemorySink { tx: left_tx },
        source: MemorySource { rx: right_rx },
    };

    (left, right)
}

/// One end of an in-memory channel.
pub struct Endpoint {
    /// Sender towards the peer.
    pub sink: MemorySink,
    /// Receiver for messages from the peer.
    pub source: MemorySource,
}

impl Endpoint {
    /// Split into sending and receiving halves.
    #[must_use]
    pub fn split(self) -> (MemorySink, MemorySource) {
        (self.sink, self.source)
    }
}

/// Sending half of an in-memory channel.
#[derive(Debug, Clone)]
pub struct MemorySink {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }
}

/// Receiving half of an in-memory channel.
#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl MemorySource {
    /// Receive a message without waiting.
    pub fn try_receive(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn receive(&mut self) -> Result<Message, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}
