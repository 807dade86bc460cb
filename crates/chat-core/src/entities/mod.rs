//! Domain entities - the local mirror of server-side state
//!
//! Every cached kind implements [`Entity`]: it can be created as an empty
//! shell from just an ID and grown by merging partial payloads into it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Snowflake;

mod channel;
mod guild;
mod member;
mod message;
mod role;
mod user;

pub use channel::{Channel, ChannelPartial, ChannelType};
pub use guild::{Guild, GuildPartial, GuildSnapshot};
pub use member::{Member, MemberPartial};
pub use message::{Message, MessagePartial};
pub use role::{Role, RolePartial};
pub use user::{PresencePartial, User, UserFlags, UserPartial, UserStatus};

/// A cached record that is merged from partial payloads.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Payload type carrying a subset of this entity's fields
    type Partial: fmt::Debug + Send + Sync;

    const KIND: EntityKind;

    /// Empty record holding only identity (and its container, if known)
    fn shell(id: Snowflake, parent_id: Option<Snowflake>) -> Self;

    fn id(&self) -> Snowflake;

    /// Containing entity: guild for channels and roles, channel for messages
    fn parent_id(&self) -> Option<Snowflake> {
        None
    }

    /// Record the containing entity when an event supplies it
    fn attach(&mut self, _parent_id: Snowflake) {}

    /// Overwrite only the fields present in `partial`
    fn merge(&mut self, partial: &Self::Partial);

    /// Take from `partial` only what this record is still missing.
    ///
    /// Applied instead of [`merge`](Self::merge) when the payload may
    /// predate the cached state. Max-merged fields still advance.
    fn fill(&mut self, partial: &Self::Partial);

    fn into_snapshot(self) -> EntitySnapshot;
}

/// Kind tag for cached entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Guild,
    Channel,
    Role,
    Message,
}

impl EntityKind {
    pub const ALL: [Self; 5] = [
        Self::User,
        Self::Guild,
        Self::Channel,
        Self::Role,
        Self::Message,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownEntityKind(s.to_string()))
    }
}

/// A copy of one cached entity, tagged by kind
///
/// This is what lookups and change notifications hand out. It is a
/// point-in-time copy; later merges do not show through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySnapshot {
    User(User),
    Guild(Guild),
    Channel(Channel),
    Role(Role),
    Message(Message),
}

impl EntitySnapshot {
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Guild(_) => EntityKind::Guild,
            Self::Channel(_) => EntityKind::Channel,
            Self::Role(_) => EntityKind::Role,
            Self::Message(_) => EntityKind::Message,
        }
    }

    #[must_use]
    pub fn id(&self) -> Snowflake {
        match self {
            Self::User(e) => e.id,
            Self::Guild(e) => e.id,
            Self::Channel(e) => e.id,
            Self::Role(e) => e.id,
            Self::Message(e) => e.id,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_guild(&self) -> Option<&Guild> {
        match self {
            Self::Guild(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&Channel> {
        match self {
            Self::Channel(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_role(&self) -> Option<&Role> {
        match self {
            Self::Role(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }
}
