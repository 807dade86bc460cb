//! State manager
//!
//! Owns one [`EntityStore`] per kind plus the relationship edges between
//! them, and raises a [`ClientEvent`] for every change it applies. One
//! instance exists per client; every component that needs cached state
//! holds an `Arc` to it.
//!
//! Writes come from the gateway receive loop (in stream order) and from
//! hydration tasks (in any order). Both go through the same per-entity
//! atomic upsert; a hydration response that finds the entity rewritten
//! since its lookup started only fills missing fields.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chat_core::{
    Channel, ChannelPartial, ClientEvent, Entity, EntityKind, EntitySnapshot, Guild,
    GuildPartial, GuildSnapshot, Member, MemberPartial, Message, MessagePartial,
    PresencePartial, Role, RolePartial, Snowflake, User, UserFlags, UserPartial,
};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::ReadySnapshot;
use crate::hydration::Hydrator;
use crate::store::{EntityStore, MemberStore, RelationIndex, Upsert};

/// State manager configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Capacity of the change-notification channel
    pub event_buffer: usize,
    /// Messages requested when a channel's history is hydrated
    pub history_limit: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            event_buffer: 1024,
            history_limit: 50,
        }
    }
}

/// Authoritative local mirror of server-side state
pub struct StateManager {
    pub(crate) config: CacheConfig,

    users: EntityStore<User>,
    guilds: EntityStore<Guild>,
    channels: EntityStore<Channel>,
    roles: EntityStore<Role>,
    messages: EntityStore<Message>,
    members: MemberStore,

    /// Guild → channel IDs
    guild_channels: RelationIndex,
    /// Guild → role IDs
    guild_roles: RelationIndex,
    /// Channel → message IDs
    channel_messages: RelationIndex,

    current_user: RwLock<Option<Snowflake>>,
    ready: AtomicBool,
    /// Bumped on every clear; hydration results from an older generation are dropped
    generation: AtomicU64,

    events: broadcast::Sender<ClientEvent>,

    pub(crate) hydrator: RwLock<Option<Arc<dyn Hydrator>>>,
    pub(crate) in_flight: DashSet<(EntityKind, Snowflake)>,
    pub(crate) history_requested: DashSet<Snowflake>,
}

impl StateManager {
    /// Create a new state manager
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            config,
            users: EntityStore::new(),
            guilds: EntityStore::new(),
            channels: EntityStore::new(),
            roles: EntityStore::new(),
            messages: EntityStore::new(),
            members: MemberStore::new(),
            guild_channels: RelationIndex::new(),
            guild_roles: RelationIndex::new(),
            channel_messages: RelationIndex::new(),
            current_user: RwLock::new(None),
            ready: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            events,
            hydrator: RwLock::new(None),
            in_flight: DashSet::new(),
            history_requested: DashSet::new(),
        }
    }

    /// Create a new state manager wrapped in Arc
    #[must_use]
    pub fn new_shared(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Install the client used for hydration lookups
    pub fn set_hydrator(&self, hydrator: Arc<dyn Hydrator>) {
        *self.hydrator.write() = Some(hydrator);
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Receive every event raised from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Raise an event to subscribers
    pub fn publish(&self, event: ClientEvent) {
        tracing::trace!(event = event.name(), "Publishing client event");
        // No receivers is not an error
        let _ = self.events.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    // =========================================================================
    // Generic upsert / remove
    // =========================================================================

    fn apply<E: Entity>(
        &self,
        store: &EntityStore<E>,
        id: Snowflake,
        parent_id: Option<Snowflake>,
        partial: &E::Partial,
    ) -> E {
        self.announce(id, store.upsert(id, parent_id, partial))
    }

    /// Like [`apply`](Self::apply) for lookup responses; see
    /// [`EntityStore::upsert_hydrated`]
    fn apply_looked_up<E: Entity>(
        &self,
        store: &EntityStore<E>,
        id: Snowflake,
        parent_id: Option<Snowflake>,
        partial: &E::Partial,
        seen: Option<u64>,
    ) -> Option<E> {
        let Some(result) = store.upsert_hydrated(id, parent_id, partial, seen) else {
            tracing::debug!(kind = %E::KIND, id = %id, "Entity removed during hydration, response dropped");
            return None;
        };
        Some(self.announce(id, result))
    }

    fn announce<E: Entity>(&self, id: Snowflake, result: Upsert<E>) -> E {
        match result {
            Upsert::Created(entity) => {
                tracing::trace!(kind = %E::KIND, id = %id, "Entity created");
                self.publish(ClientEvent::Created(entity.clone().into_snapshot()));
                entity
            }
            Upsert::Updated { before, after } => {
                tracing::trace!(kind = %E::KIND, id = %id, "Entity updated");
                self.publish(ClientEvent::Updated {
                    before: before.into_snapshot(),
                    after: after.clone().into_snapshot(),
                });
                after
            }
        }
    }

    fn evict<E: Entity>(&self, store: &EntityStore<E>, id: Snowflake) -> Option<E> {
        let removed = store.remove(id)?;
        tracing::trace!(kind = %E::KIND, id = %id, "Entity removed");
        self.publish(ClientEvent::Removed(removed.clone().into_snapshot()));
        Some(removed)
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn upsert_user(&self, partial: &UserPartial) -> User {
        self.apply(&self.users, partial.id, None, partial)
    }

    /// Merge into the connected account's record
    pub fn update_current_user(&self, partial: &UserPartial) -> User {
        self.users.get_or_create(partial.id, None);
        self.users
            .modify(partial.id, |user| user.flags.insert(UserFlags::CURRENT));
        *self.current_user.write() = Some(partial.id);
        self.upsert_user(partial)
    }

    /// Apply a presence change (status plus any changed user fields)
    pub fn apply_presence(&self, presence: &PresencePartial) -> User {
        self.upsert_user(&presence.clone().into_user_partial())
    }

    /// Advance a user's activity timestamp; never moves it backwards
    pub fn record_activity(&self, user_id: Snowflake, at: DateTime<Utc>) -> User {
        self.upsert_user(&UserPartial::activity(user_id, at))
    }

    /// Record a typing indicator and raise it to subscribers
    pub fn record_typing(&self, channel_id: Snowflake, user_id: Snowflake, at: DateTime<Utc>) {
        self.record_activity(user_id, at);
        self.publish(ClientEvent::TypingStarted {
            channel_id,
            user_id,
            at,
        });
    }

    pub fn user(&self, id: Snowflake) -> Option<User> {
        self.users.get(id)
    }

    pub fn current_user(&self) -> Option<User> {
        let id = (*self.current_user.read())?;
        self.users.get(id)
    }

    /// Case-insensitive lookup by username and optional discriminator
    pub fn user_by_tag(&self, username: &str, discriminator: Option<&str>) -> Option<User> {
        self.users
            .find(|user| user.matches_tag(username, discriminator))
    }

    pub fn users(&self) -> &EntityStore<User> {
        &self.users
    }

    // =========================================================================
    // Guilds
    // =========================================================================

    pub fn upsert_guild(&self, partial: &GuildPartial) -> Guild {
        self.apply(&self.guilds, partial.id, None, partial)
    }

    /// Apply a full guild payload, splitting embedded lists into their indices
    pub fn apply_guild_snapshot(&self, snapshot: &GuildSnapshot) -> Guild {
        let mut partial = snapshot.guild.clone();
        // A full payload without an explicit flag means the guild is available.
        partial.unavailable = Some(partial.unavailable.unwrap_or(false));
        let guild = self.upsert_guild(&partial);

        for role in &snapshot.roles {
            self.upsert_role(guild.id, role);
        }
        for channel in &snapshot.channels {
            self.upsert_channel(channel, Some(guild.id));
        }
        for member in &snapshot.members {
            self.upsert_member(guild.id, member);
        }
        for presence in &snapshot.presences {
            self.apply_presence(presence);
        }

        tracing::debug!(
            guild_id = %guild.id,
            channels = snapshot.channels.len(),
            roles = snapshot.roles.len(),
            members = snapshot.members.len(),
            unavailable = guild.unavailable,
            "Guild snapshot applied"
        );
        guild
    }

    /// Flag a guild as in an outage without dropping it
    pub fn mark_guild_unavailable(&self, id: Snowflake) -> Guild {
        self.upsert_guild(&GuildPartial {
            id,
            unavailable: Some(true),
            ..GuildPartial::default()
        })
    }

    /// Remove a guild. Its channels, roles and memberships stay cached;
    /// their guild references simply stop resolving.
    pub fn remove_guild(&self, id: Snowflake) -> Option<Guild> {
        self.evict(&self.guilds, id)
    }

    pub fn guild(&self, id: Snowflake) -> Option<Guild> {
        self.guilds.get(id)
    }

    pub fn guilds(&self) -> &EntityStore<Guild> {
        &self.guilds
    }

    // =========================================================================
    // Channels
    // =========================================================================

    /// Merge a channel payload. `guild_id` overrides the payload's own
    /// reference, for channels embedded in a guild payload.
    pub fn upsert_channel(&self, partial: &ChannelPartial, guild_id: Option<Snowflake>) -> Channel {
        if let Some(recipients) = &partial.recipients {
            for recipient in recipients {
                self.upsert_user(recipient);
            }
        }

        let channel = self.apply(&self.channels, partial.id, guild_id.or(partial.guild_id), partial);
        self.link_channel(&channel);
        channel
    }

    fn link_channel(&self, channel: &Channel) {
        if let Some(guild_id) = channel.guild_id {
            self.guild_channels.link(guild_id, channel.id);
        }
    }

    pub fn remove_channel(&self, id: Snowflake) -> Option<Channel> {
        self.history_requested.remove(&id);
        self.evict(&self.channels, id)
    }

    pub fn channel(&self, id: Snowflake) -> Option<Channel> {
        self.channels.get(id)
    }

    /// Channels of a guild that are still cached
    pub fn guild_channels(&self, guild_id: Snowflake) -> Vec<Channel> {
        let mut channels: Vec<_> = self
            .guild_channels
            .children(guild_id)
            .into_iter()
            .filter_map(|id| self.channels.get(id))
            .filter(|channel| channel.guild_id == Some(guild_id))
            .collect();
        channels.sort_by_key(|c| (c.position, c.id));
        channels
    }

    pub fn private_channels(&self) -> Vec<Channel> {
        self.channels.filter(Channel::is_private)
    }

    pub fn channels(&self) -> &EntityStore<Channel> {
        &self.channels
    }

    // =========================================================================
    // Roles
    // =========================================================================

    pub fn upsert_role(&self, guild_id: Snowflake, partial: &RolePartial) -> Role {
        let role = self.apply(&self.roles, partial.id, Some(guild_id), partial);
        self.guild_roles.link(guild_id, role.id);
        role
    }

    pub fn remove_role(&self, id: Snowflake) -> Option<Role> {
        self.evict(&self.roles, id)
    }

    pub fn role(&self, id: Snowflake) -> Option<Role> {
        self.roles.get(id)
    }

    /// Roles of a guild that are still cached
    pub fn guild_roles(&self, guild_id: Snowflake) -> Vec<Role> {
        let mut roles: Vec<_> = self
            .guild_roles
            .children(guild_id)
            .into_iter()
            .filter_map(|id| self.roles.get(id))
            .collect();
        roles.sort_by_key(|r| (r.position, r.id));
        roles
    }

    pub fn roles(&self) -> &EntityStore<Role> {
        &self.roles
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Merge a message payload.
    ///
    /// The embedded author is merged first with its activity advanced to the
    /// message timestamp, and the channel's newest message ID is advanced.
    /// Both are max-merges, so replays and out-of-order arrivals are safe.
    pub fn upsert_message(&self, partial: &MessagePartial) -> Message {
        if let Some(author) = author_with_activity(partial) {
            self.upsert_user(&author);
        }
        if let Some(mentions) = &partial.mentions {
            for mentioned in mentions {
                self.upsert_user(mentioned);
            }
        }

        let message = self.apply(&self.messages, partial.id, partial.channel_id, partial);
        self.link_message(&message);
        message
    }

    /// Index a message under its channel and advance the channel's newest
    /// message ID
    fn link_message(&self, message: &Message) {
        if let Some(channel_id) = message.channel_id {
            self.channel_messages.link(channel_id, message.id);
            let advances = self
                .channels
                .get(channel_id)
                .is_some_and(|c| c.last_message_id.is_none_or(|last| last < message.id));
            if advances {
                self.apply(
                    &self.channels,
                    channel_id,
                    None,
                    &ChannelPartial {
                        id: channel_id,
                        last_message_id: Some(Some(message.id)),
                        ..ChannelPartial::default()
                    },
                );
            }
        }
    }

    pub fn remove_message(&self, id: Snowflake) -> Option<Message> {
        self.evict(&self.messages, id)
    }

    pub fn message(&self, id: Snowflake) -> Option<Message> {
        self.messages.get(id)
    }

    /// Cached messages of a channel, oldest first. Never hydrates.
    pub fn cached_messages(&self, channel_id: Snowflake) -> Vec<Message> {
        let mut messages: Vec<_> = self
            .channel_messages
            .children(channel_id)
            .into_iter()
            .filter_map(|id| self.messages.get(id))
            .collect();
        messages.sort_by_key(|m| m.id);
        messages
    }

    /// Author of a message, if both are cached
    pub fn message_author(&self, message: &Message) -> Option<User> {
        message.author_id.and_then(|id| self.users.get(id))
    }

    pub fn messages(&self) -> &EntityStore<Message> {
        &self.messages
    }

    // =========================================================================
    // Lookup responses
    // =========================================================================
    //
    // `seen` is the entry's revision when the lookup started. Nested records
    // (authors, recipients) carry no revision and are only ever filled.

    pub(crate) fn upsert_looked_up_user(&self, partial: &UserPartial, seen: Option<u64>) -> Option<User> {
        self.apply_looked_up(&self.users, partial.id, None, partial, seen)
    }

    pub(crate) fn upsert_looked_up_guild(&self, partial: &GuildPartial, seen: Option<u64>) -> Option<Guild> {
        self.apply_looked_up(&self.guilds, partial.id, None, partial, seen)
    }

    pub(crate) fn upsert_looked_up_channel(
        &self,
        partial: &ChannelPartial,
        guild_id: Option<Snowflake>,
        seen: Option<u64>,
    ) -> Option<Channel> {
        if let Some(recipients) = &partial.recipients {
            for recipient in recipients {
                self.upsert_looked_up_user(recipient, None);
            }
        }

        let channel = self.apply_looked_up(
            &self.channels,
            partial.id,
            guild_id.or(partial.guild_id),
            partial,
            seen,
        )?;
        self.link_channel(&channel);
        Some(channel)
    }

    pub(crate) fn upsert_looked_up_role(
        &self,
        guild_id: Snowflake,
        partial: &RolePartial,
        seen: Option<u64>,
    ) -> Option<Role> {
        let role = self.apply_looked_up(&self.roles, partial.id, Some(guild_id), partial, seen)?;
        self.guild_roles.link(guild_id, role.id);
        Some(role)
    }

    pub(crate) fn upsert_looked_up_message(
        &self,
        partial: &MessagePartial,
        seen: Option<u64>,
    ) -> Option<Message> {
        if let Some(author) = author_with_activity(partial) {
            self.upsert_looked_up_user(&author, None);
        }
        if let Some(mentions) = &partial.mentions {
            for mentioned in mentions {
                self.upsert_looked_up_user(mentioned, None);
            }
        }

        let message =
            self.apply_looked_up(&self.messages, partial.id, partial.channel_id, partial, seen)?;
        self.link_message(&message);
        Some(message)
    }

    // =========================================================================
    // Memberships
    // =========================================================================

    /// Merge a membership and the user it embeds
    pub fn upsert_member(&self, guild_id: Snowflake, partial: &MemberPartial) -> Member {
        self.upsert_user(&partial.user);

        match self.members.upsert(guild_id, partial) {
            Upsert::Created(member) => {
                self.publish(ClientEvent::MemberAdded(member.clone()));
                member
            }
            Upsert::Updated { before, after } => {
                self.publish(ClientEvent::MemberUpdated {
                    before: Some(before),
                    after: after.clone(),
                });
                after
            }
        }
    }

    /// Remove a membership. The user record stays cached.
    pub fn remove_member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        let removed = self.members.remove(guild_id, user_id)?;
        self.publish(ClientEvent::MemberRemoved {
            guild_id,
            user_id,
            member: Some(removed.clone()),
        });
        Some(removed)
    }

    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.members.get(guild_id, user_id)
    }

    pub fn guild_members(&self, guild_id: Snowflake) -> Vec<Member> {
        self.members.in_guild(guild_id)
    }

    /// Guilds a user shares with the connected account
    pub fn user_guilds(&self, user_id: Snowflake) -> Vec<Guild> {
        self.members
            .guilds_of(user_id)
            .into_iter()
            .filter_map(|id| self.guilds.get(id))
            .collect()
    }

    // =========================================================================
    // Session-wide operations
    // =========================================================================

    /// Empty every index ahead of a rebuild from a new snapshot
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.ready.store(false, Ordering::Release);
        *self.current_user.write() = None;

        self.users.clear();
        self.guilds.clear();
        self.channels.clear();
        self.roles.clear();
        self.messages.clear();
        self.members.clear();
        self.guild_channels.clear();
        self.guild_roles.clear();
        self.channel_messages.clear();
        self.history_requested.clear();

        tracing::debug!("State cleared");
    }

    /// Rebuild the cache from the snapshot that follows identify.
    ///
    /// Subscribers see `Ready` only after every snapshot entity is merged.
    pub fn apply_ready(&self, ready: &ReadySnapshot) {
        self.clear();

        let user = self.update_current_user(&ready.user);
        for guild in &ready.guilds {
            self.apply_guild_snapshot(guild);
        }
        for channel in &ready.private_channels {
            self.upsert_channel(channel, None);
        }

        self.ready.store(true, Ordering::Release);
        tracing::info!(
            user_id = %user.id,
            guilds = ready.guilds.len(),
            private_channels = ready.private_channels.len(),
            "Initial snapshot applied"
        );

        self.publish(ClientEvent::Ready {
            session_id: ready.session_id.clone(),
            user_id: user.id,
            guild_count: ready.guilds.len(),
        });
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    // =========================================================================
    // Kind-tagged access
    // =========================================================================

    /// Look up any cached entity
    pub fn get(&self, kind: EntityKind, id: Snowflake) -> Option<EntitySnapshot> {
        match kind {
            EntityKind::User => self.users.get(id).map(Entity::into_snapshot),
            EntityKind::Guild => self.guilds.get(id).map(Entity::into_snapshot),
            EntityKind::Channel => self.channels.get(id).map(Entity::into_snapshot),
            EntityKind::Role => self.roles.get(id).map(Entity::into_snapshot),
            EntityKind::Message => self.messages.get(id).map(Entity::into_snapshot),
        }
    }

    /// Stamp of the last write to a cached entity
    pub fn revision(&self, kind: EntityKind, id: Snowflake) -> Option<u64> {
        match kind {
            EntityKind::User => self.users.revision(id),
            EntityKind::Guild => self.guilds.revision(id),
            EntityKind::Channel => self.channels.revision(id),
            EntityKind::Role => self.roles.revision(id),
            EntityKind::Message => self.messages.revision(id),
        }
    }

    /// Cached entity, or a new shell if absent. Never touches the network.
    pub fn get_or_create(
        &self,
        kind: EntityKind,
        id: Snowflake,
        parent_id: Option<Snowflake>,
    ) -> EntitySnapshot {
        match kind {
            EntityKind::User => self.users.get_or_create(id, parent_id).0.into_snapshot(),
            EntityKind::Guild => self.guilds.get_or_create(id, parent_id).0.into_snapshot(),
            EntityKind::Channel => self.channels.get_or_create(id, parent_id).0.into_snapshot(),
            EntityKind::Role => self.roles.get_or_create(id, parent_id).0.into_snapshot(),
            EntityKind::Message => self.messages.get_or_create(id, parent_id).0.into_snapshot(),
        }
    }

    /// Remove any cached entity, raising a removal only if it was present
    pub fn remove(&self, kind: EntityKind, id: Snowflake) -> Option<EntitySnapshot> {
        match kind {
            EntityKind::User => self.evict(&self.users, id).map(Entity::into_snapshot),
            EntityKind::Guild => self.remove_guild(id).map(Entity::into_snapshot),
            EntityKind::Channel => self.remove_channel(id).map(Entity::into_snapshot),
            EntityKind::Role => self.remove_role(id).map(Entity::into_snapshot),
            EntityKind::Message => self.remove_message(id).map(Entity::into_snapshot),
        }
    }

    /// First cached entity of a kind matching the predicate
    pub fn find<P>(&self, kind: EntityKind, predicate: P) -> Option<EntitySnapshot>
    where
        P: Fn(&EntitySnapshot) -> bool,
    {
        self.all(kind).into_iter().find(|snapshot| predicate(snapshot))
    }

    /// Every cached entity of a kind
    pub fn all(&self, kind: EntityKind) -> Vec<EntitySnapshot> {
        fn snapshots<E: Entity>(store: &EntityStore<E>) -> Vec<EntitySnapshot> {
            store.all().into_iter().map(Entity::into_snapshot).collect()
        }

        match kind {
            EntityKind::User => snapshots(&self.users),
            EntityKind::Guild => snapshots(&self.guilds),
            EntityKind::Channel => snapshots(&self.channels),
            EntityKind::Role => snapshots(&self.roles),
            EntityKind::Message => snapshots(&self.messages),
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::User => self.users.len(),
            EntityKind::Guild => self.guilds.len(),
            EntityKind::Channel => self.channels.len(),
            EntityKind::Role => self.roles.len(),
            EntityKind::Message => self.messages.len(),
        }
    }
}

/// Embedded author with its activity advanced to the message timestamp
fn author_with_activity(partial: &MessagePartial) -> Option<UserPartial> {
    let mut author = partial.author.clone()?;
    if author.last_activity.is_none() {
        author.last_activity = partial.timestamp;
    }
    Some(author)
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("users", &self.users.len())
            .field("guilds", &self.guilds.len())
            .field("channels", &self.channels.len())
            .field("roles", &self.roles.len())
            .field("messages", &self.messages.len())
            .field("members", &self.members.len())
            .field("ready", &self.is_ready())
            .finish()
    }
}
