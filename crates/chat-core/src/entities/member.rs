//! Membership - the edge between a User and a Guild
//!
//! A membership carries the per-guild attributes of a user. It is keyed
//! by (guild, user) and references the user by ID, so renaming a user is
//! visible through every guild it belongs to.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::UserPartial;
use crate::merge::{self, deserialize_some};
use crate::value_objects::Snowflake;

/// Cached membership record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub guild_id: Snowflake,
    pub user_id: Snowflake,
    pub nick: Option<String>,
    pub role_ids: Vec<Snowflake>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Partial membership payload
///
/// `guild_id` is present on standalone member events and absent when the
/// member is embedded in a guild payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MemberPartial {
    pub user: UserPartial,
    pub guild_id: Option<Snowflake>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub nick: Option<Option<String>>,
    pub roles: Option<Vec<Snowflake>>,
    pub joined_at: Option<DateTime<Utc>>,
}

impl Member {
    /// Create an empty membership
    #[must_use]
    pub fn new(guild_id: Snowflake, user_id: Snowflake) -> Self {
        Self {
            guild_id,
            user_id,
            nick: None,
            role_ids: Vec::new(),
            joined_at: None,
        }
    }

    /// Get display name (nickname if set, otherwise fallback)
    pub fn display_name<'a>(&'a self, username: &'a str) -> &'a str {
        self.nick.as_deref().unwrap_or(username)
    }

    /// Check if member has a specific role
    #[inline]
    pub fn has_role(&self, role_id: Snowflake) -> bool {
        self.role_ids.contains(&role_id)
    }

    /// Apply a partial membership payload
    pub fn merge(&mut self, partial: &MemberPartial) {
        merge::set_nullable(&mut self.nick, partial.nick.as_ref());
        merge::set_value(&mut self.role_ids, partial.roles.as_ref());
        merge::set(&mut self.joined_at, partial.joined_at.as_ref());
    }
}
