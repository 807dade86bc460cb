//! Guild entity - a server that contains channels, roles and members

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{ChannelPartial, Entity, EntityKind, EntitySnapshot, MemberPartial, PresencePartial, RolePartial};
use crate::merge::{self, deserialize_some};
use crate::value_objects::Snowflake;

/// Cached guild record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    pub id: Snowflake,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub owner_id: Option<Snowflake>,
    pub member_count: Option<u64>,
    pub large: bool,
    /// Set while the guild is in an outage, or until its full payload arrives.
    pub unavailable: bool,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Partial guild payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GuildPartial {
    pub id: Snowflake,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub icon: Option<Option<String>>,
    pub owner_id: Option<Snowflake>,
    pub member_count: Option<u64>,
    pub large: Option<bool>,
    pub unavailable: Option<bool>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Full guild payload as delivered on join or after an outage
///
/// Channels, roles and members arrive embedded; the cache splits them
/// out into their own indices and keeps only ID edges.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuildSnapshot {
    #[serde(flatten)]
    pub guild: GuildPartial,
    #[serde(default)]
    pub channels: Vec<ChannelPartial>,
    #[serde(default)]
    pub roles: Vec<RolePartial>,
    #[serde(default)]
    pub members: Vec<MemberPartial>,
    #[serde(default)]
    pub presences: Vec<PresencePartial>,
}

impl GuildSnapshot {
    #[inline]
    pub fn id(&self) -> Snowflake {
        self.guild.id
    }
}

impl Guild {
    /// Check if the guild has a complete payload
    #[inline]
    pub fn is_available(&self) -> bool {
        !self.unavailable
    }
}

impl Entity for Guild {
    type Partial = GuildPartial;
    const KIND: EntityKind = EntityKind::Guild;

    fn shell(id: Snowflake, _parent_id: Option<Snowflake>) -> Self {
        Self {
            id,
            name: None,
            icon: None,
            owner_id: None,
            member_count: None,
            large: false,
            unavailable: false,
            joined_at: None,
        }
    }

    fn id(&self) -> Snowflake {
        self.id
    }

    fn merge(&mut self, partial: &GuildPartial) {
        merge::set(&mut self.name, partial.name.as_ref());
        merge::set_nullable(&mut self.icon, partial.icon.as_ref());
        merge::set(&mut self.owner_id, partial.owner_id.as_ref());
        merge::set(&mut self.member_count, partial.member_count.as_ref());
        merge::set_value(&mut self.large, partial.large.as_ref());
        merge::set_value(&mut self.unavailable, partial.unavailable.as_ref());
        merge::set(&mut self.joined_at, partial.joined_at.as_ref());
    }

    fn fill(&mut self, partial: &GuildPartial) {
        merge::fill(&mut self.name, partial.name.as_ref());
        merge::fill_nullable(&mut self.icon, partial.icon.as_ref());
        merge::fill(&mut self.owner_id, partial.owner_id.as_ref());
        merge::fill(&mut self.member_count, partial.member_count.as_ref());
        merge::fill(&mut self.joined_at, partial.joined_at.as_ref());
    }

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::Guild(self)
    }
}
