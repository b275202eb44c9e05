//! Channel capability consumed by both ends of a session.

use std::sync::Arc;

use async_trait::async_trait;
use remote_shell_core::Message;
use thiserror::Error;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Channel closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Undecodable message {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },
}

impl TransportError {
    /// Whether the channel is unusable after this error.
    ///
    /// Decode, encode and frame size failures concern a single message; the
    /// channel itself stays open.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed | Self::Io(_))
    }
}

/// Sending half of a channel.
///
/// Shared between the loops of a session, so sends take `&self`.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send a message, in order, to the peer.
    async fn send(&self, message: Message) -> Result<(), TransportError>;
}

/// Receiving half of a channel.
#[async_trait]
pub trait MessageSource: Send {
    /// Block until the next message arrives.
    async fn receive(&mut self) -> Result<Message, TransportError>;
}

#[async_trait]
impl<T: MessageSink + ?Sized> MessageSink for Arc<T> {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        (**self).send(message).await
    }
}

#[async_trait]
impl<T: MessageSource + ?Sized> MessageSource for Box<T> {
    async fn receive(&mut self) -> Result<Message, TransportError> {
        (**self).receive().await
    }
}
