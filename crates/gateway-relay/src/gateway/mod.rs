//! Gateway WebSocket client.
//!
//! Manages one session with the gateway: handshake, heartbeat scheduling,
//! sequence tracking and the receive loop that feeds an event sink.

mod client;
mod close;
mod connection;
mod heartbeat;
mod sequence;
mod state;

pub use client::{ClientOptions, DEFAULT_MAX_FRAME_SIZE, GatewayClient};
pub use close::CloseReason;
pub use connection::Connection;
pub use heartbeat::{HeartbeatHandle, start_heartbeat_task};
pub use sequence::{SequenceTracker, SessionState};
pub use state::{AtomicSessionPhase, SessionPhase};
