//! WebSocket transport owned by a gateway session.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gateway_proto::GatewayMessage;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::debug;

use crate::error::RelayError;

use super::client::ClientOptions;
use super::close::CloseReason;

/// Bound on the closing handshake; a peer that stopped reading is dropped.
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write half handed to the outbound writer task.
pub(crate) type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;
/// Read half consumed by the receive loop.
pub(crate) type WsSource<S> = SplitStream<WebSocketStream<S>>;

/// A bidirectional gateway connection.
///
/// Owned by one session for its whole lifetime. [`Connection::close`]
/// consumes the value, so a connection can only be closed once.
pub struct Connection<S = MaybeTlsStream<TcpStream>> {
    stream: WebSocketStream<S>,
}

impl Connection {
    /// Open a WebSocket to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connection`] if the transport cannot be
    /// established within the configured timeout.
    pub async fn open(endpoint: &str, options: &ClientOptions) -> Result<Self, RelayError> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(options.max_frame_size);
        config.max_frame_size = Some(options.max_frame_size);

        let (stream, response) = timeout(
            options.connect_timeout,
            connect_async_with_config(endpoint, Some(config), false),
        )
        .await
        .map_err(|_| RelayError::Connection("connection timeout".to_string()))?
        .map_err(|e| RelayError::Connection(format!("failed to connect: {e}")))?;

        debug!(status = %response.status(), "websocket upgrade complete");
        Ok(Self { stream })
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-upgraded WebSocket stream.
    #[must_use]
    pub const fn from_stream(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }

    /// Send one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded or written.
    pub async fn send(&mut self, message: &GatewayMessage) -> Result<(), RelayError> {
        self.stream
            .send(encode(message)?)
            .await
            .map_err(|e| RelayError::Connection(format!("send failed: {e}")))
    }

    /// Receive the next protocol frame, skipping control frames.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connection`] if the peer closes or the read
    /// fails, and [`RelayError::Decode`] if the frame is not a gateway
    /// message.
    pub async fn recv(&mut self) -> Result<GatewayMessage, RelayError> {
        loop {
            let frame = match self.stream.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    return Err(RelayError::Connection(format!("receive failed: {e}")));
                }
                None => return Err(RelayError::Connection("connection closed".to_string())),
            };

            match decode(frame)? {
                Inbound::Message(message) => return Ok(message),
                Inbound::Closed(reason) => return Err(RelayError::Connection(reason.to_string())),
                Inbound::Control => {}
            }
        }
    }

    /// Close the connection with a normal close frame.
    ///
    /// Failures are logged; the peer may already be gone. Gives up after
    /// one second if the peer is not reading.
    pub async fn close(mut self) {
        match timeout(CLOSE_TIMEOUT, self.stream.close(None)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "close handshake incomplete"),
            Err(_) => debug!("close handshake timed out"),
        }
    }

    pub(crate) fn split(self) -> (WsSink<S>, WsSource<S>) {
        self.stream.split()
    }
}

/// A decoded transport frame.
#[derive(Debug)]
pub(crate) enum Inbound {
    Message(GatewayMessage),
    Closed(CloseReason),
    Control,
}

pub(crate) fn decode(frame: Message) -> Result<Inbound, RelayError> {
    match frame {
        Message::Text(text) => Ok(Inbound::Message(GatewayMessage::from_json(text.as_str())?)),
        Message::Binary(bytes) => {
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| RelayError::Decode(format!("binary frame is not utf-8: {e}")))?;
            Ok(Inbound::Message(GatewayMessage::from_json(text)?))
        }
        Message::Close(frame) => Ok(Inbound::Closed(match frame {
            Some(frame) => CloseReason::Remote {
                code: Some(u16::from(frame.code)),
                reason: frame.reason.to_string(),
            },
            None => CloseReason::Remote {
                code: None,
                reason: String::new(),
            },
        })),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(Inbound::Control),
    }
}

pub(crate) fn encode(message: &GatewayMessage) -> Result<Message, RelayError> {
    Ok(Message::Text(message.to_json()?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_proto::Opcode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn test_decode_text_frame() {
        let frame = Message::Text(r#"{"op":0,"d":{},"s":3,"t":"READY"}"#.into());
        match decode(frame).unwrap() {
            Inbound::Message(msg) => {
                assert_eq!(msg.op, Opcode::Dispatch);
                assert_eq!(msg.sequence, Some(3));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_binary_frame() {
        let frame = Message::Binary(br#"{"op":11}"#.to_vec().into());
        assert!(matches!(decode(frame).unwrap(), Inbound::Message(_)));
    }

    #[test]
    fn test_decode_missing_op_is_decode_error() {
        let frame = Message::Text(r#"{"d":null}"#.into());
        assert!(matches!(decode(frame), Err(RelayError::Decode(_))));
    }

    #[test]
    fn test_decode_invalid_utf8_binary() {
        let frame = Message::Binary(vec![0xff, 0xfe].into());
        assert!(matches!(decode(frame), Err(RelayError::Decode(_))));
    }

    #[test]
    fn test_decode_close_frame() {
        let frame = Message::Close(Some(CloseFrame {
            code: CloseCode::Library(4004),
            reason: "Authentication failed.".into(),
        }));
        match decode(frame).unwrap() {
            Inbound::Closed(CloseReason::Remote { code, reason }) => {
                assert_eq!(code, Some(4004));
                assert_eq!(reason, "Authentication failed.");
            }
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_control_frames() {
        assert!(matches!(
            decode(Message::Ping(vec![1].into())).unwrap(),
            Inbound::Control
        ));
        assert!(matches!(
            decode(Message::Pong(vec![].into())).unwrap(),
            Inbound::Control
        ));
    }

    #[test]
    fn test_encode_heartbeat() {
        match encode(&GatewayMessage::heartbeat(Some(7))).unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"op":1,"d":7}"#),
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}
