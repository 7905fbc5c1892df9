//! Sink feeding an in-process channel.

use gateway_proto::GatewayMessage;
use tokio::sync::mpsc;
use tracing::warn;

use super::EventSink;

/// Sink that forwards messages into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<GatewayMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<GatewayMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Wrap an existing sender.
    #[must_use]
    pub const fn from_sender(tx: mpsc::Sender<GatewayMessage>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    async fn deliver(&self, message: GatewayMessage) {
        if self.tx.send(message).await.is_err() {
            warn!("event receiver dropped, discarding message");
        }
    }
}
