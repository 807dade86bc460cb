//! Gateway message format
//!
//! Every frame on the gateway connection is one JSON envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{HelloPayload, IdentifyPayload, OpCode, RequestGuildMembersPayload, ResumePayload};

/// Gateway message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event name (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event data payload
    #[serde(default)]
    pub d: Option<Value>,
}

impl GatewayMessage {
    fn control(op: OpCode, d: Option<Value>) -> Self {
        Self {
            op,
            t: None,
            s: None,
            d,
        }
    }

    // === Client Messages ===

    /// Create an Identify message (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self::control(OpCode::Identify, serde_json::to_value(payload).ok())
    }

    /// Create a Resume message (op=6)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self::control(OpCode::Resume, serde_json::to_value(payload).ok())
    }

    /// Create a Heartbeat message (op=1) carrying the last sequence seen
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat,
            t: None,
            s: None,
            d: Some(last_sequence.map_or(Value::Null, |s| Value::Number(s.into()))),
        }
    }

    /// Create a Request Guild Members message (op=8)
    #[must_use]
    pub fn request_guild_members(payload: &RequestGuildMembersPayload) -> Self {
        Self::control(OpCode::RequestGuildMembers, serde_json::to_value(payload).ok())
    }

    // === Server Messages ===

    /// Create a Dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            t: Some(event_type.into()),
            s: Some(sequence),
            d: Some(data),
        }
    }

    /// Create a Hello message (op=10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::control(
            OpCode::Hello,
            serde_json::to_value(HelloPayload::with_interval(heartbeat_interval)).ok(),
        )
    }

    /// Create a Heartbeat ACK message (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::control(OpCode::HeartbeatAck, None)
    }

    /// Create a Reconnect message (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::control(OpCode::Reconnect, None)
    }

    /// Create an Invalid Session message (op=9)
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::control(OpCode::InvalidSession, Some(Value::Bool(resumable)))
    }

    // === Parsing Server Messages ===

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        self.d.as_ref().and_then(|d| HelloPayload::deserialize(d).ok())
    }

    /// Resumable flag of an Invalid Session message (op=9); absent means false
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Try to parse as an Identify payload (op=2)
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        if self.op != OpCode::Identify {
            return None;
        }
        self.d.as_ref().and_then(|d| IdentifyPayload::deserialize(d).ok())
    }

    /// Try to parse as a Resume payload (op=6)
    pub fn as_resume(&self) -> Option<ResumePayload> {
        if self.op != OpCode::Resume {
            return None;
        }
        self.d.as_ref().and_then(|d| ResumePayload::deserialize(d).ok())
    }

    /// Sequence carried by a heartbeat (op=1)
    pub fn as_heartbeat_seq(&self) -> Option<Option<u64>> {
        if self.op != OpCode::Heartbeat {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_u64))
    }

    // === Utilities ===

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
