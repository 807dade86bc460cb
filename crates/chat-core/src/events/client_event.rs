//! Client events - the single typed notification stream
//!
//! Every change the client observes (connection lifecycle, entity merges,
//! membership edges, activity) is raised as one [`ClientEvent`] variant on
//! one channel. Consumers filter by [`EventCategories`] instead of
//! registering per-event callbacks.

use bitflags::bitflags;
use chrono::{DateTime, Utc};

use crate::entities::{EntityKind, EntitySnapshot, Member};
use crate::value_objects::Snowflake;

bitflags! {
    /// Event categories a subscriber can select
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventCategories: u8 {
        /// Connected, disconnected, ready, resumed
        const CONNECTION = 1 << 0;
        /// Entity created, updated, removed
        const ENTITY = 1 << 1;
        /// Membership added, updated, removed
        const MEMBER = 1 << 2;
        /// Typing and other transient activity
        const ACTIVITY = 1 << 3;
    }
}

impl Default for EventCategories {
    fn default() -> Self {
        Self::all()
    }
}

/// All possible client events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    // =========================================================================
    // Connection Events
    // =========================================================================
    /// Session reached steady state on a new physical connection
    Connected { epoch: u64, resumed: bool },
    /// Physical connection lost; `reconnecting` is false once retry stops
    Disconnected {
        epoch: u64,
        reconnecting: bool,
        reason: String,
    },
    /// Initial snapshot fully applied to the cache
    Ready {
        session_id: String,
        user_id: Snowflake,
        guild_count: usize,
    },
    /// Prior session re-attached; missed events are being replayed
    Resumed { session_id: String },

    // =========================================================================
    // Entity Events
    // =========================================================================
    Created(EntitySnapshot),
    Updated {
        before: EntitySnapshot,
        after: EntitySnapshot,
    },
    Removed(EntitySnapshot),

    // =========================================================================
    // Member Events
    // =========================================================================
    MemberAdded(Member),
    MemberUpdated {
        before: Option<Member>,
        after: Member,
    },
    MemberRemoved {
        guild_id: Snowflake,
        user_id: Snowflake,
        member: Option<Member>,
    },

    // =========================================================================
    // Activity Events
    // =========================================================================
    TypingStarted {
        channel_id: Snowflake,
        user_id: Snowflake,
        at: DateTime<Utc>,
    },
}

impl ClientEvent {
    /// Get the event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "CONNECTED",
            Self::Disconnected { .. } => "DISCONNECTED",
            Self::Ready { .. } => "READY",
            Self::Resumed { .. } => "RESUMED",
            Self::Created(_) => "ENTITY_CREATED",
            Self::Updated { .. } => "ENTITY_UPDATED",
            Self::Removed(_) => "ENTITY_REMOVED",
            Self::MemberAdded(_) => "MEMBER_ADDED",
            Self::MemberUpdated { .. } => "MEMBER_UPDATED",
            Self::MemberRemoved { .. } => "MEMBER_REMOVED",
            Self::TypingStarted { .. } => "TYPING_STARTED",
        }
    }

    /// Category used for subscriber filtering
    pub fn category(&self) -> EventCategories {
        match self {
            Self::Connected { .. }
            | Self::Disconnected { .. }
            | Self::Ready { .. }
            | Self::Resumed { .. } => EventCategories::CONNECTION,
            Self::Created(_) | Self::Updated { .. } | Self::Removed(_) => EventCategories::ENTITY,
            Self::MemberAdded(_) | Self::MemberUpdated { .. } | Self::MemberRemoved { .. } => {
                EventCategories::MEMBER
            }
            Self::TypingStarted { .. } => EventCategories::ACTIVITY,
        }
    }

    /// Entity kind for entity events
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Self::Created(e) | Self::Removed(e) => Some(e.kind()),
            Self::Updated { after, .. } => Some(after.kind()),
            _ => None,
        }
    }
}
