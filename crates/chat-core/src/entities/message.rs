//! Message entity - content posted to a channel

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Entity, EntityKind, EntitySnapshot, UserPartial};
use crate::merge::{self, deserialize_some};
use crate::value_objects::Snowflake;

/// Cached message record
///
/// The author is referenced by ID and resolved through the user index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub author_id: Option<Snowflake>,
    pub content: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub edited_timestamp: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub tts: bool,
    pub mention_ids: Vec<Snowflake>,
}

/// Partial message payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessagePartial {
    pub id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub author: Option<UserPartial>,
    pub content: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub edited_timestamp: Option<Option<DateTime<Utc>>>,
    pub pinned: Option<bool>,
    pub tts: Option<bool>,
    pub mentions: Option<Vec<UserPartial>>,
}

impl MessagePartial {
    /// Point in time this payload describes, if it says
    fn version(&self) -> Option<DateTime<Utc>> {
        match self.edited_timestamp {
            Some(Some(edited)) => Some(edited),
            _ => self.timestamp,
        }
    }
}

impl Message {
    /// Point in time the cached content describes
    #[inline]
    pub fn version(&self) -> Option<DateTime<Utc>> {
        self.edited_timestamp.or(self.timestamp)
    }

    #[inline]
    pub fn is_edited(&self) -> bool {
        self.edited_timestamp.is_some()
    }

    /// Check if a payload describes an older revision than the cached one
    fn is_stale(&self, partial: &MessagePartial) -> bool {
        matches!(
            (partial.version(), self.version()),
            (Some(incoming), Some(cached)) if incoming < cached
        )
    }
}

impl Entity for Message {
    type Partial = MessagePartial;
    const KIND: EntityKind = EntityKind::Message;

    fn shell(id: Snowflake, parent_id: Option<Snowflake>) -> Self {
        Self {
            id,
            channel_id: parent_id,
            guild_id: None,
            author_id: None,
            content: None,
            timestamp: None,
            edited_timestamp: None,
            pinned: false,
            tts: false,
            mention_ids: Vec::new(),
        }
    }

    fn id(&self) -> Snowflake {
        self.id
    }

    fn parent_id(&self) -> Option<Snowflake> {
        self.channel_id
    }

    fn attach(&mut self, parent_id: Snowflake) {
        self.channel_id = Some(parent_id);
    }

    /// Immutable fields always merge. Revisable fields (content, pins,
    /// mentions) are skipped when the payload is an older revision, so a
    /// late hydration response cannot roll back an edit.
    fn merge(&mut self, partial: &MessagePartial) {
        let stale = self.is_stale(partial);

        merge::set(&mut self.channel_id, partial.channel_id.as_ref());
        merge::set(&mut self.guild_id, partial.guild_id.as_ref());
        if let Some(author) = &partial.author {
            self.author_id = Some(author.id);
        }
        merge::set_latest(&mut self.timestamp, partial.timestamp);

        if stale {
            return;
        }
        merge::set(&mut self.content, partial.content.as_ref());
        merge::set_nullable(&mut self.edited_timestamp, partial.edited_timestamp.as_ref());
        merge::set_value(&mut self.pinned, partial.pinned.as_ref());
        merge::set_value(&mut self.tts, partial.tts.as_ref());
        if let Some(mentions) = &partial.mentions {
            self.mention_ids = mentions.iter().map(|m| m.id).collect();
        }
    }

    fn fill(&mut self, partial: &MessagePartial) {
        merge::fill(&mut self.channel_id, partial.channel_id.as_ref());
        merge::fill(&mut self.guild_id, partial.guild_id.as_ref());
        if self.author_id.is_none() {
            self.author_id = partial.author.as_ref().map(|author| author.id);
        }
        merge::set_latest(&mut self.timestamp, partial.timestamp);
        merge::fill(&mut self.content, partial.content.as_ref());
        merge::fill_nullable(&mut self.edited_timestamp, partial.edited_timestamp.as_ref());
    }

    fn into_snapshot(self) -> EntitySnapshot {
        EntitySnapshot::Message(self)
    }
}
