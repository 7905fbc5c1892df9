//! Gateway opcodes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer tag identifying a frame's role.
///
/// Opcodes outside the known set decode to [`Opcode::Unknown`] rather than
/// failing, so new server-side opcodes still reach the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Opcode {
    /// Server event carrying a sequence number and event name.
    Dispatch,
    /// Keep-alive, sent by the client or requested by the server.
    Heartbeat,
    /// Client handshake carrying credentials.
    Identify,
    /// Client presence change.
    PresenceUpdate,
    /// Client voice state change.
    VoiceStateUpdate,
    /// Resume a previous session.
    Resume,
    /// Server asks the client to reconnect.
    Reconnect,
    /// Client request for guild members.
    RequestGuildMembers,
    /// Server rejected the session.
    InvalidSession,
    /// First server frame, carrying the heartbeat interval.
    Hello,
    /// Server acknowledgement of a heartbeat.
    HeartbeatAck,
    /// Any opcode this crate does not name.
    Unknown(u8),
}

impl Opcode {
    /// Numeric wire value.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::PresenceUpdate => 3,
            Self::VoiceStateUpdate => 4,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::RequestGuildMembers => 8,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
            Self::Unknown(code) => code,
        }
    }

    /// Lowercase name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Heartbeat => "heartbeat",
            Self::Identify => "identify",
            Self::PresenceUpdate => "presence_update",
            Self::VoiceStateUpdate => "voice_state_update",
            Self::Resume => "resume",
            Self::Reconnect => "reconnect",
            Self::RequestGuildMembers => "request_guild_members",
            Self::InvalidSession => "invalid_session",
            Self::Hello => "hello",
            Self::HeartbeatAck => "heartbeat_ack",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<u8> for Opcode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op.code()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.name())
    }
}
