//! Gateway frame definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ProtoError;
use crate::identify::IdentifyPayload;
use crate::opcode::Opcode;

/// One frame exchanged with the gateway, in either direction.
///
/// `sequence` and `event_type` are only set on dispatch frames. `op` must fit
/// in a byte and `s` must be a non-negative integer; other values fail to
/// decode. The payload is kept as raw JSON; nothing in this crate
/// interprets it beyond the Hello interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Opcode.
    pub op: Opcode,
    /// Payload.
    #[serde(rename = "d", default)]
    pub data: Value,
    /// Server-assigned sequence number.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Dispatch event name.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl GatewayMessage {
    /// Create a frame with the given opcode and payload.
    #[must_use]
    pub const fn new(op: Opcode, data: Value) -> Self {
        Self {
            op,
            data,
            sequence: None,
            event_type: None,
        }
    }

    /// Create a heartbeat carrying the last seen sequence, or `null` before
    /// any dispatch has arrived.
    #[must_use]
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self::new(Opcode::Heartbeat, sequence.map_or(Value::Null, Value::from))
    }

    /// Create an identify frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be converted to JSON.
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, ProtoError> {
        let data =
            serde_json::to_value(payload).map_err(|e| ProtoError::Encoding(e.to_string()))?;
        Ok(Self::new(Opcode::Identify, data))
    }

    /// Create a hello frame.
    #[must_use]
    pub fn hello(heartbeat_interval_ms: u64) -> Self {
        Self::new(
            Opcode::Hello,
            json!({ "heartbeat_interval": heartbeat_interval_ms }),
        )
    }

    /// Create a dispatch frame.
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: Opcode::Dispatch,
            data,
            sequence: Some(sequence),
            event_type: Some(event_type.into()),
        }
    }

    /// Extract the heartbeat interval from a hello frame, in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not a hello frame, or if the interval is
    /// missing or not a non-negative integer.
    pub fn heartbeat_interval(&self) -> Result<u64, ProtoError> {
        if self.op != Opcode::Hello {
            return Err(ProtoError::UnexpectedOpcode {
                expected: Opcode::Hello,
                found: self.op,
            });
        }

        self.data
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .ok_or(ProtoError::MissingField("heartbeat_interval"))
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object with an integer `op`.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}
