//! Newline-delimited JSON sink.
//!
//! Each message is written as one JSON object followed by `\n`. This is the
//! host bridge format: the host reads lines from a Unix socket (or stdout)
//! and dispatches them to its own handlers.

use gateway_proto::GatewayMessage;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::RelayError;

use super::EventSink;

/// Sink writing one JSON document per line to an async writer.
#[derive(Debug)]
pub struct LineSink<W> {
    writer: Mutex<W>,
}

impl<W> LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_line(&self, message: &GatewayMessage) -> Result<(), RelayError> {
        let mut line = message.to_json()?.into_bytes();
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(unix)]
impl LineSink<tokio::net::UnixStream> {
    /// Connect to the host bridge listening on a Unix socket.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Sink`] if the socket cannot be reached.
    pub async fn bridge(path: impl AsRef<std::path::Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
            RelayError::Sink(format!("failed to connect to bridge '{}': {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "connected to host bridge");
        Ok(Self::new(stream))
    }
}

impl LineSink<Stdout> {
    /// Write lines to the process's stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> EventSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn deliver(&self, message: GatewayMessage) {
        if let Err(e) = self.write_line(&message).await {
            warn!(error = %e, op = %message.op, "failed to deliver message to host");
        }
    }
}
