//! Gateway event types
//!
//! Names carried in the `t` field of dispatch messages that this client
//! routes into the cache.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayEventType {
    // Connection events
    /// Initial snapshot after a successful Identify
    Ready,
    /// Sent after successful Resume
    Resumed,

    // Guild events
    /// Guild available, joined, or created
    GuildCreate,
    /// Guild settings changed
    GuildUpdate,
    /// Left guild, kicked, or guild outage
    GuildDelete,

    // Role events
    GuildRoleCreate,
    GuildRoleUpdate,
    GuildRoleDelete,

    // Channel events
    /// Channel created
    ChannelCreate,
    /// Channel updated
    ChannelUpdate,
    /// Channel deleted
    ChannelDelete,

    // Message events
    /// New message
    MessageCreate,
    /// Message edited (may be partial)
    MessageUpdate,
    /// Message deleted
    MessageDelete,
    /// Several messages deleted at once
    MessageDeleteBulk,

    // Member events
    /// User joined guild
    GuildMemberAdd,
    /// Member updated (roles, nickname)
    GuildMemberUpdate,
    /// User left guild
    GuildMemberRemove,
    /// Reply to a Request Guild Members
    GuildMembersChunk,

    // Presence events
    /// User status changed
    PresenceUpdate,
    /// User started typing
    TypingStart,

    // User events
    /// Current user updated
    UserUpdate,
}

impl GatewayEventType {
    /// Get the string representation of the event type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::GuildRoleCreate => "GUILD_ROLE_CREATE",
            Self::GuildRoleUpdate => "GUILD_ROLE_UPDATE",
            Self::GuildRoleDelete => "GUILD_ROLE_DELETE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::MessageDeleteBulk => "MESSAGE_DELETE_BULK",
            Self::GuildMemberAdd => "GUILD_MEMBER_ADD",
            Self::GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
            Self::GuildMemberRemove => "GUILD_MEMBER_REMOVE",
            Self::GuildMembersChunk => "GUILD_MEMBERS_CHUNK",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::TypingStart => "TYPING_START",
            Self::UserUpdate => "USER_UPDATE",
        }
    }

    /// Parse an event type from its wire name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "READY" => Some(Self::Ready),
            "RESUMED" => Some(Self::Resumed),
            "GUILD_CREATE" => Some(Self::GuildCreate),
            "GUILD_UPDATE" => Some(Self::GuildUpdate),
            "GUILD_DELETE" => Some(Self::GuildDelete),
            "GUILD_ROLE_CREATE" => Some(Self::GuildRoleCreate),
            "GUILD_ROLE_UPDATE" => Some(Self::GuildRoleUpdate),
            "GUILD_ROLE_DELETE" => Some(Self::GuildRoleDelete),
            "CHANNEL_CREATE" => Some(Self::ChannelCreate),
            "CHANNEL_UPDATE" => Some(Self::ChannelUpdate),
            "CHANNEL_DELETE" => Some(Self::ChannelDelete),
            "MESSAGE_CREATE" => Some(Self::MessageCreate),
            "MESSAGE_UPDATE" => Some(Self::MessageUpdate),
            "MESSAGE_DELETE" => Some(Self::MessageDelete),
            "MESSAGE_DELETE_BULK" => Some(Self::MessageDeleteBulk),
            "GUILD_MEMBER_ADD" => Some(Self::GuildMemberAdd),
            "GUILD_MEMBER_UPDATE" => Some(Self::GuildMemberUpdate),
            "GUILD_MEMBER_REMOVE" => Some(Self::GuildMemberRemove),
            "GUILD_MEMBERS_CHUNK" => Some(Self::GuildMembersChunk),
            "PRESENCE_UPDATE" => Some(Self::PresenceUpdate),
            "TYPING_START" => Some(Self::TypingStart),
            "USER_UPDATE" => Some(Self::UserUpdate),
            _ => None,
        }
    }

    /// Session-level events are consumed by the session controller first
    #[must_use]
    pub const fn is_session_event(self) -> bool {
        matches!(self, Self::Ready | Self::Resumed)
    }
}

impl fmt::Display for GatewayEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<GatewayEventType> for String {
    fn from(event: GatewayEventType) -> Self {
        event.as_str().to_string()
    }
}
