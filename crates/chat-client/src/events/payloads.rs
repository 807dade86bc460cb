//! Event payload definitions
//!
//! Payloads whose shape is specific to one dispatch event. Entity-shaped
//! events (channel, guild, message, member) decode straight into the
//! partials from `chat_core`.

use chat_core::{MemberPartial, PresencePartial, RolePartial, Snowflake, UserPartial};
use chrono::{DateTime, Utc};
use serde::Deserialize;

// === Guild Events ===

/// GUILD_DELETE event payload
///
/// `unavailable: true` means an outage, not that the client left.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildDeleteEvent {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: Option<bool>,
}

impl GuildDeleteEvent {
    #[must_use]
    pub fn is_outage(&self) -> bool {
        self.unavailable.unwrap_or(false)
    }
}

/// GUILD_ROLE_CREATE / GUILD_ROLE_UPDATE event payload
#[derive(Debug, Clone, Deserialize)]
pub struct GuildRoleEvent {
    pub guild_id: Snowflake,
    pub role: RolePartial,
}

/// GUILD_ROLE_DELETE event payload
#[derive(Debug, Clone, Deserialize)]
pub struct GuildRoleDeleteEvent {
    pub guild_id: Snowflake,
    pub role_id: Snowflake,
}

// === Message Events ===

/// MESSAGE_DELETE event payload
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeleteEvent {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

/// MESSAGE_DELETE_BULK event payload
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeleteBulkEvent {
    pub ids: Vec<Snowflake>,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

// === Member Events ===

/// GUILD_MEMBER_REMOVE event payload
#[derive(Debug, Clone, Deserialize)]
pub struct MemberRemoveEvent {
    pub guild_id: Snowflake,
    pub user: UserPartial,
}

/// GUILD_MEMBERS_CHUNK event payload
#[derive(Debug, Clone, Deserialize)]
pub struct MembersChunkEvent {
    pub guild_id: Snowflake,
    pub members: Vec<MemberPartial>,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default)]
    pub chunk_count: u32,
    #[serde(default)]
    pub presences: Vec<PresencePartial>,
}

impl MembersChunkEvent {
    /// Whether this chunk completes the reply
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.chunk_index + 1 >= self.chunk_count
    }
}

// === Presence Events ===

/// TYPING_START event payload
#[derive(Debug, Clone, Deserialize)]
pub struct TypingStartEvent {
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub user_id: Snowflake,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    #[serde(default)]
    pub member: Option<MemberPartial>,
}

impl TypingStartEvent {
    /// Typing time, falling back to now for an out-of-range timestamp
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_else(Utc::now)
    }
}
