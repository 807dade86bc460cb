//! Channel entity - a guild channel, category, or private conversation

use serde::Deserialize;

use super::{Entity, EntityKind, EntitySnapshot, UserPartial};
use crate::merge::{self, deserialize_some};
use crate::value_objects::Snowflake;

/// Channel type tag
///
/// Channel variants are one record distinguished by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(from = "u8")]
pub enum ChannelType {
    #[default]
    GuildText,
    Dm,
    GuildVoice,
    GroupDm,
    GuildCategory,
    GuildAnnouncement,
    GuildStageVoice,
    GuildForum,
    /// Types this client does not model yet
    Unknown(u8),
}

impl ChannelType {
    /// Get the numeric value
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::GuildText => 0,
            Self::Dm => 1,
            Self::GuildVoice => 2,
            Self::GroupDm => 3,
            Self::GuildCategory => 4,
            Self::GuildAnnouncement => 5,
            Self::GuildStageVoice => 13,
            Self::GuildForum => 15,
            Self::Unknown(value) => value,
        }
    }

    /// Check if this type lives outside any guild
    #[inline]
    #[must_use]
    pub const fn is_private(self) -> bool {
        matches!(self, Self::Dm | Self::GroupDm)
    }
}

impl From<u8> for ChannelType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::GuildText,
            1 => Self::Dm,
            2 => Self::GuildVoice,
            3 => Self::GroupDm,
            4 => Self::GuildCategory,
            5 => Self::GuildAnnouncement,
            13 => Self::GuildStageVoice,
            15 => Self::GuildForum,
            other => Self::Unknown(other),
        }
    }
}

/// Cached channel record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub kind: ChannelType,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub position: Option<i32>,
    pub parent_id: Option<Snowflake>,
    pub nsfw: bool,
    /// Newest message ID seen, from the channel payload or from messages.
    pub last_message_id: Option<Snowflake>,
    /// Participants of a private channel, resolved through the user index.
    pub recipient_ids: Vec<Snowflake>,
}

/// Partial channel payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelPartial {
    pub id: Snowflake,
    pub guild_id: Option<Snowflake>,
    #[serde(rename = "type")]
    pub kind: Option<ChannelType>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub topic: Option<Option<String>>,
    pub position: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub parent_id: Option<Option<Snowflake>>,
    pub nsfw: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub last_message_id: Option<Option<Snowflake>>,
    pub recipients: Option<Vec<UserPartial>>,
}

impl Channel {
    #[inline]
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.kind.is_private()
    }

    #[inline]
    #[must_use]
    pub fn is_category(&self) -> bool {
        matches!(self.kind, ChannelType::GuildCategory)
    }

    /// Get display name (channel name or fallback for DMs)
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Direct Message")
    }
}

impl Entity for Channel {
    type Partial = ChannelPartial;
    const KIND: EntityKind = EntityKind::Channel;

    fn shell(id: Snowflake, parent_id: Option<Snowflake>) -> Self {
        Self {
            id,
            guild_id: parent_id,
            kind: ChannelType::default(),
            name: None,
            topic: None,
            position: None,
            parent_id: None,
            nsfw: false,
            last_message_id: None,
            recipient_ids: Vec::new(),
        }
    }

    fn id(&self) -> Snowflake {
        self.id
    }

    fn parent_id(&self) -> Option<Snowflake> {
        self.guild_id
    }

    fn attach(&mut self, parent_id: Snowflake) {
        self.guild_id = Some(parent_id);
    }

    fn merge(&mut self, partial: &ChannelPartial) {
        merge::set(&mut self.guild_id, partial.guild_id.as_ref());
        merge::set_value(&mut self.kind, partial.kind.as_ref());
        merge::set(&mut self.name, partial.name.as_ref());
        merge::set_nullable(&mut self.topic, partial.topic.as_ref());
        merge::set(&mut self.position, partial.position.as_ref());
        merge::set_nullable(&mut self.parent_id, partial.parent_id.as_ref());
        merge::set_value(&mut self.nsfw, partial.nsfw.as_ref());
        merge::set_latest(&mut self.last_message_id, partial.last_message_id.flatten());
        if let Some(recipients) = &partial.recipients {
            self.recipient_ids = recipients.iter().map(|r| r.id).collect();
        }
    }

    fn fill(&mut self, partial: &ChannelPartial) {
        merge::fill(&mut self.guild_id, partial.guild_id.as_ref());
        merge::fill(&mut self.name, partial.name.as_ref());
        merge::fill_nullable(&mut self.topic, partial.topic.as_ref());
        merge::fill(&mut self.position, partial.position.as_ref());
        merge::fill_nullable(&mut self.parent_id, partial.parent_id.as_ref());
        merge::set_latest(&mut self.last_message_id, partial.last_message_id.flatten());
        if self.recipient_ids.is_empty() {
            if let Some(recipients) = &partial.recipients {
                self.recipient_ids = recipients.iter().map(|r| r.id).collect();
            }
        }
    }

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::Channel(self)
    }
}
