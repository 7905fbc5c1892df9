//! Why a session ended without an error.

use std::fmt;

/// Reason an orderly session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The server sent a close frame.
    Remote {
        /// WebSocket close code, if the frame carried one.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
    /// The stream ended without a close frame.
    StreamEnded,
    /// The session's shutdown token was cancelled locally.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote {
                code: Some(code),
                reason,
            } if !reason.is_empty() => write!(f, "closed by server: {reason} (code: {code})"),
            Self::Remote { code: Some(code), .. } => write!(f, "closed by server (code: {code})"),
            Self::Remote { code: None, .. } => f.write_str("closed by server"),
            Self::StreamEnded => f.write_str("connection closed"),
            Self::Shutdown => f.write_str("shut down locally"),
        }
    }
}
