//! Role entity - a named permission set inside a guild
//!
//! Permission bits are kept as the raw string the platform sends; this
//! crate does not interpret them.

use serde::Deserialize;

use super::{Entity, EntityKind, EntitySnapshot};
use crate::merge;
use crate::value_objects::Snowflake;

/// Cached role record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub name: Option<String>,
    pub color: Option<u32>,
    pub hoist: bool,
    pub position: Option<i32>,
    pub permissions: Option<String>,
    pub managed: bool,
    pub mentionable: bool,
}

/// Partial role payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RolePartial {
    pub id: Snowflake,
    pub name: Option<String>,
    pub color: Option<u32>,
    pub hoist: Option<bool>,
    pub position: Option<i32>,
    pub permissions: Option<String>,
    pub managed: Option<bool>,
    pub mentionable: Option<bool>,
}

impl Role {
    /// The @everyone role shares its ID with the guild
    #[inline]
    pub fn is_everyone(&self) -> bool {
        self.guild_id == Some(self.id)
    }
}

impl Entity for Role {
    type Partial = RolePartial;
    const KIND: EntityKind = EntityKind::Role;

    fn shell(id: Snowflake, parent_id: Option<Snowflake>) -> Self {
        Self {
            id,
            guild_id: parent_id,
            name: None,
            color: None,
            hoist: false,
            position: None,
            permissions: None,
            managed: false,
            mentionable: false,
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

    fn merge(&mut self, partial: &RolePartial) {
        merge::set(&mut self.name, partial.name.as_ref());
        merge::set(&mut self.color, partial.color.as_ref());
        merge::set_value(&mut self.hoist, partial.hoist.as_ref());
        merge::set(&mut self.position, partial.position.as_ref());
        merge::set(&mut self.permissions, partial.permissions.as_ref());
        merge::set_value(&mut self.managed, partial.managed.as_ref());
        merge::set_value(&mut self.mentionable, partial.mentionable.as_ref());
    }

    fn fill(&mut self, partial: &RolePartial) {
        merge::fill(&mut self.name, partial.name.as_ref());
        merge::fill(&mut self.color, partial.color.as_ref());
        merge::fill(&mut self.position, partial.position.as_ref());
        merge::fill(&mut self.permissions, partial.permissions.as_ref());
    }

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::Role(self)
    }
}
