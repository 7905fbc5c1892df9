//! Session phase types.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Phase of one connection attempt.
///
/// Phases only move forward. There is no resuming phase: once a session
/// reaches `Closed` a new client has to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    /// Not connected.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Sending the identify frame.
    Identifying,
    /// Waiting for the server's hello.
    AwaitingHello,
    /// Receive loop and heartbeat both running.
    Ready,
    /// Tearing down.
    Closing,
    /// Connection closed.
    Closed,
}

impl SessionPhase {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Identifying,
            3 => Self::AwaitingHello,
            4 => Self::Ready,
            5 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::AwaitingHello => "awaiting_hello",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Atomic wrapper for the session phase.
#[derive(Debug)]
pub struct AtomicSessionPhase(AtomicU8);

impl AtomicSessionPhase {
    /// Create a new atomic phase.
    #[must_use]
    pub const fn new(phase: SessionPhase) -> Self {
        Self(AtomicU8::new(phase as u8))
    }

    /// Load the current phase.
    #[must_use]
    pub fn load(&self) -> SessionPhase {
        SessionPhase::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Store a new phase.
    pub fn store(&self, phase: SessionPhase) {
        self.0.store(phase as u8, Ordering::SeqCst);
    }

    /// Move from `from` to `to` only if the current phase is `from`.
    ///
    /// Returns `false` when another caller already moved the phase on.
    pub fn transition(&self, from: SessionPhase, to: SessionPhase) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Move to `Closing` from any phase before it.
    ///
    /// Returns `true` for exactly one caller per session.
    pub fn begin_close(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < SessionPhase::Closing as u8).then_some(SessionPhase::Closing as u8)
            })
            .is_ok()
    }
}
