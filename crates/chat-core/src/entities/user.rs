//! User entity - a platform account seen through the gateway
//!
//! One record exists per user ID no matter how many guilds, channels or
//! messages reference it. Those relationships point here by ID only.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind, EntitySnapshot};
use crate::merge::{self, deserialize_some};
use crate::value_objects::Snowflake;

bitflags! {
    /// Capabilities that distinguish special accounts.
    ///
    /// Variants of a user (bot, system account, the connected account
    /// itself) are flags on one record rather than separate types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UserFlags: u8 {
        const BOT = 1 << 0;
        const SYSTEM = 1 << 1;
        /// The account this client is logged in as.
        const CURRENT = 1 << 2;
    }
}

/// Online status as reported by presence updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Idle,
    Dnd,
    Invisible,
    #[default]
    Offline,
}

impl UserStatus {
    /// Check if this status should be visible to others
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !matches!(self, Self::Offline | Self::Invisible)
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Idle => write!(f, "idle"),
            Self::Dnd => write!(f, "dnd"),
            Self::Invisible => write!(f, "invisible"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Cached user record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Snowflake,
    pub username: Option<String>,
    pub discriminator: Option<String>,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
    pub flags: UserFlags,
    pub status: UserStatus,
    /// Most recent activity observed (message sent, typing, joined).
    pub last_activity: Option<DateTime<Utc>>,
}

/// Partial user payload
///
/// `status` and `last_activity` never come from a user object on the wire;
/// event handlers fill them in from the surrounding payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserPartial {
    pub id: Snowflake,
    pub username: Option<String>,
    pub discriminator: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub global_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub avatar: Option<Option<String>>,
    pub bot: Option<bool>,
    pub system: Option<bool>,
    #[serde(skip)]
    pub status: Option<UserStatus>,
    #[serde(skip)]
    pub last_activity: Option<DateTime<Utc>>,
}

impl UserPartial {
    /// Partial carrying only an ID
    #[must_use]
    pub fn with_id(id: Snowflake) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Partial that only advances the activity timestamp
    #[must_use]
    pub fn activity(id: Snowflake, at: DateTime<Utc>) -> Self {
        Self {
            id,
            last_activity: Some(at),
            ..Self::default()
        }
    }
}

/// Presence payload: a status change plus whatever user fields changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PresencePartial {
    pub user: UserPartial,
    pub guild_id: Option<Snowflake>,
    pub status: Option<UserStatus>,
}

impl PresencePartial {
    /// Fold the status into the embedded user partial
    #[must_use]
    pub fn into_user_partial(self) -> UserPartial {
        let mut user = self.user;
        if self.status.is_some() {
            user.status = self.status;
        }
        user
    }
}

impl User {
    /// Get the full tag: username#discriminator
    ///
    /// Accounts migrated to unique usernames report discriminator "0" and
    /// are shown by username alone.
    pub fn tag(&self) -> Option<String> {
        let username = self.username.as_deref()?;
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => Some(format!("{username}#{d}")),
            _ => Some(username.to_string()),
        }
    }

    /// Name to show in a UI: global display name, then username
    pub fn display_name(&self) -> Option<&str> {
        self.global_name.as_deref().or(self.username.as_deref())
    }

    #[inline]
    pub fn is_bot(&self) -> bool {
        self.flags.contains(UserFlags::BOT)
    }

    #[inline]
    pub fn is_current(&self) -> bool {
        self.flags.contains(UserFlags::CURRENT)
    }

    /// Case-insensitive match on username and discriminator
    pub fn matches_tag(&self, username: &str, discriminator: Option<&str>) -> bool {
        let name_matches = self
            .username
            .as_deref()
            .is_some_and(|u| u.eq_ignore_ascii_case(username));
        match discriminator {
            Some(d) => name_matches && self.discriminator.as_deref() == Some(d),
            None => name_matches,
        }
    }
}

impl Entity for User {
    type Partial = UserPartial;
    const KIND: EntityKind = EntityKind::User;

    fn shell(id: Snowflake, _parent_id: Option<Snowflake>) -> Self {
        Self {
            id,
            username: None,
            discriminator: None,
            global_name: None,
            avatar: None,
            flags: UserFlags::empty(),
            status: UserStatus::Offline,
            last_activity: None,
        }
    }

    fn id(&self) -> Snowflake {
        self.id
    }

    fn merge(&mut self, partial: &UserPartial) {
        merge::set(&mut self.username, partial.username.as_ref());
        merge::set(&mut self.discriminator, partial.discriminator.as_ref());
        merge::set_nullable(&mut self.global_name, partial.global_name.as_ref());
        merge::set_nullable(&mut self.avatar, partial.avatar.as_ref());
        if let Some(bot) = partial.bot {
            self.flags.set(UserFlags::BOT, bot);
        }
        if let Some(system) = partial.system {
            self.flags.set(UserFlags::SYSTEM, system);
        }
        merge::set_value(&mut self.status, partial.status.as_ref());
        merge::set_latest(&mut self.last_activity, partial.last_activity);
    }

    fn fill(&mut self, partial: &UserPartial) {
        merge::fill(&mut self.username, partial.username.as_ref());
        merge::fill(&mut self.discriminator, partial.discriminator.as_ref());
        merge::fill_nullable(&mut self.global_name, partial.global_name.as_ref());
        merge::fill_nullable(&mut self.avatar, partial.avatar.as_ref());
        merge::set_latest(&mut self.last_activity, partial.last_activity);
    }

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::User(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn partial_from(json: &str) -> UserPartial {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_shell_has_only_id() {
        let user = User::shell(Snowflake::new(7), None);
        assert_eq!(user.id, Snowflake::new(7));
        assert!(user.username.is_none());
        assert!(user.flags.is_empty());
        assert_eq!(user.status, UserStatus::Offline);
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut user = User::shell(Snowflake::new(1), None);
        user.merge(&partial_from(
            r#"{"id":"1","username":"alice","discriminator":"0042","avatar":"abc","bot":true}"#,
        ));
        user.merge(&partial_from(r#"{"id":"1","username":"alice2"}"#));

        assert_eq!(user.username.as_deref(), Some("alice2"));
        assert_eq!(user.discriminator.as_deref(), Some("0042"));
        assert_eq!(user.avatar.as_deref(), Some("abc"));
        assert!(user.is_bot());
    }

    #[test]
    fn test_merge_null_avatar_clears() {
        let mut user = User::shell(Snowflake::new(1), None);
        user.merge(&partial_from(r#"{"id":"1","avatar":"abc"}"#));
        user.merge(&partial_from(r#"{"id":"1","avatar":null}"#));
        assert!(user.avatar.is_none());
    }

    #[test]
    fn test_last_activity_never_regresses() {
        let newer = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let older = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();

        let mut user = User::shell(Snowflake::new(1), None);
        user.merge(&UserPartial::activity(user.id, newer));
        user.merge(&UserPartial::activity(user.id, older));
        assert_eq!(user.last_activity, Some(newer));
    }

    #[test]
    fn test_tag_and_matches() {
        let mut user = User::shell(Snowflake::new(1), None);
        user.merge(&partial_from(
            r#"{"id":"1","username":"Alice","discriminator":"0042"}"#,
        ));
        assert_eq!(user.tag().as_deref(), Some("Alice#0042"));
        assert!(user.matches_tag("alice", Some("0042")));
        assert!(!user.matches_tag("alice", Some("0001")));

        user.merge(&partial_from(r#"{"id":"1","discriminator":"0"}"#));
        assert_eq!(user.tag().as_deref(), Some("Alice"));
    }

    #[test]
    fn test_presence_folds_status() {
        let presence: PresencePartial = serde_json::from_str(
            r#"{"user":{"id":"1","username":"alice"},"guild_id":"9","status":"idle"}"#,
        )
        .unwrap();
        let partial = presence.into_user_partial();
        assert_eq!(partial.status, Some(UserStatus::Idle));

        let mut user = User::shell(Snowflake::new(1), None);
        user.merge(&partial);
        assert_eq!(user.status, UserStatus::Idle);
        assert_eq!(user.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_status_visibility() {
        assert!(UserStatus::Online.is_visible());
        assert!(!UserStatus::Invisible.is_visible());
        assert_eq!(UserStatus::Dnd.to_string(), "dnd");
    }
}
