//! Error types for the gateway-proto crate.

use thiserror::Error;

use crate::opcode::Opcode;

/// Errors that can occur while encoding or decoding gateway frames.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a frame.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a frame.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A frame arrived with a different opcode than the one required.
    #[error("unexpected opcode: expected {expected}, got {found}")]
    UnexpectedOpcode {
        /// Opcode the caller required.
        expected: Opcode,
        /// Opcode actually present on the frame.
        found: Opcode,
    },

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
