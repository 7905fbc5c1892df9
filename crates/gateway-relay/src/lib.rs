//! Gateway relay.
//!
//! Keeps one authenticated WebSocket session open to a chat gateway and
//! relays every inbound message to a host process.
//!
//! # Architecture
//!
//! - `gateway` - Session client: handshake, heartbeat task, sequence tracking
//! - `sink` - Where decoded messages go (host bridge socket, stdout, channel)
//! - `config` - Relay configuration and credential loading
//! - `error` - Session error kinds

pub mod config;
pub mod error;
pub mod gateway;
pub mod sink;

pub use config::{RelayConfig, TokenSource};
pub use error::RelayError;
pub use gateway::{ClientOptions, CloseReason, GatewayClient, SessionPhase};
pub use sink::{ChannelSink, EventSink, LineSink};
