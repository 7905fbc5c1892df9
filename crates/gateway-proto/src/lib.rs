//! # gateway-proto
//!
//! Wire types for the real-time gateway protocol: JSON frames carrying an
//! opcode, a payload, and (for dispatches) a sequence number and event name.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod identify;
pub mod messages;
pub mod opcode;

pub use error::ProtoError;
pub use identify::{ClientMetadata, ClientProperties, ClientState, IdentifyPayload, Presence};
pub use messages::GatewayMessage;
pub use opcode::Opcode;
