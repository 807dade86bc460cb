//! Control payload definitions

use chat_core::Snowflake;
use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,

    pub properties: IdentifyProperties,

    /// Member count above which a guild's offline members are not sent
    pub large_threshold: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intents: Option<u64>,

    /// `[shard_id, shard_count]` for sharded connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
}

/// Client connection properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: env!("CARGO_PKG_NAME").to_string(),
            device: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// Payload for op 8 (Request Guild Members)
///
/// The server answers with one or more GUILD_MEMBERS_CHUNK dispatches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGuildMembersPayload {
    pub guild_id: Snowflake,
    /// Username prefix; empty string requests everyone
    pub query: String,
    /// Maximum members to send; 0 means no limit
    pub limit: u32,
    #[serde(default)]
    pub presences: bool,
}

impl RequestGuildMembersPayload {
    /// Request every member of a guild
    #[must_use]
    pub fn all(guild_id: Snowflake) -> Self {
        Self {
            guild_id,
            query: String::new(),
            limit: 0,
            presences: false,
        }
    }
}
