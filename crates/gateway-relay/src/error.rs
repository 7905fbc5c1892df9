//! Error types for gateway-relay.

use gateway_proto::ProtoError;
use thiserror::Error;

/// Errors that can end a gateway session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Transport could not be opened, or failed while open.
    #[error("gateway connection failed: {0}")]
    Connection(String),

    /// The server broke the handshake contract (missing or malformed hello).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Event sink could not be set up.
    #[error("sink error: {0}")]
    Sink(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtoError> for RelayError {
    fn from(err: ProtoError) -> Self {
        match err {
            ProtoError::Decoding(msg) => Self::Decode(msg),
            other => Self::Protocol(other.to_string()),
        }
    }
}
