//! Detached hydration tasks
//!
//! A lookup never runs on the caller's task. The receive loop asks for
//! a hydration and moves on; the response is merged whenever it lands.
//! A response that lands after the stream has written the same entity
//! only fills the fields that are still missing.

use std::sync::Arc;

use chat_core::{
    Channel, ChannelPartial, DomainError, EntityKind, Guild, GuildPartial, Message,
    MessagePartial, RolePartial, Snowflake, User, UserPartial,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::{HydrationError, HydrationRequest};
use crate::state::StateManager;

fn decode<T: DeserializeOwned>(kind: EntityKind, payload: Value) -> Result<T, DomainError> {
    serde_json::from_value(payload).map_err(|e| DomainError::invalid_payload(kind, e))
}

impl StateManager {
    /// Start a detached lookup for one entity.
    ///
    /// Returns `None` when no hydrator is installed, no runtime is
    /// available, or an identical lookup is already in flight.
    pub fn hydrate(self: &Arc<Self>, request: HydrationRequest) -> Option<JoinHandle<()>> {
        let hydrator = self.hydrator.read().clone()?;
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!(%request, "No runtime, hydration skipped");
            return None;
        };

        let key = (request.kind, request.id);
        if !self.in_flight.insert(key) {
            tracing::trace!(%request, "Hydration already in flight");
            return None;
        }

        let generation = self.generation();
        let seen = self.revision(request.kind, request.id);
        let state = Arc::clone(self);

        Some(runtime.spawn(async move {
            tracing::debug!(%request, "Hydrating");
            let result = hydrator.fetch(request).await;
            state.in_flight.remove(&key);

            if state.generation() != generation {
                tracing::debug!(%request, "Cache rebuilt during hydration, result dropped");
                return;
            }

            match result {
                Ok(Some(payload)) => {
                    if let Err(e) = state.apply_hydrated(request, payload, seen) {
                        tracing::warn!(%request, error = %e, "Hydrated payload dropped");
                    }
                }
                Ok(None) => {
                    tracing::debug!(%request, "Hydration found nothing, cache left unchanged");
                }
                Err(e) => {
                    tracing::warn!(%request, error = %e, "Hydration failed");
                }
            }
        }))
    }

    /// Merge a hydrated payload.
    ///
    /// `seen` is the entity's revision when the lookup started (`None` if
    /// it was not cached). If the entity was written since, the payload
    /// only fills gaps; if it was removed since, the payload is dropped.
    pub fn apply_hydrated(
        &self,
        request: HydrationRequest,
        payload: Value,
        seen: Option<u64>,
    ) -> Result<(), HydrationError> {
        match request.kind {
            EntityKind::User => {
                let partial: UserPartial = decode(request.kind, payload)?;
                self.upsert_looked_up_user(&partial, seen);
            }
            EntityKind::Guild => {
                let partial: GuildPartial = decode(request.kind, payload)?;
                self.upsert_looked_up_guild(&partial, seen);
            }
            EntityKind::Channel => {
                let partial: ChannelPartial = decode(request.kind, payload)?;
                self.upsert_looked_up_channel(&partial, request.parent_id, seen);
            }
            EntityKind::Role => {
                let guild_id = request
                    .parent_id
                    .ok_or(HydrationError::MissingParent(EntityKind::Role))?;
                let partial: RolePartial = decode(request.kind, payload)?;
                self.upsert_looked_up_role(guild_id, &partial, seen);
            }
            EntityKind::Message => {
                let mut partial: MessagePartial = decode(request.kind, payload)?;
                if partial.channel_id.is_none() {
                    partial.channel_id = request.parent_id;
                }
                self.upsert_looked_up_message(&partial, seen);
            }
        }
        Ok(())
    }

    /// Fetch a channel's recent history, once per channel per session
    pub fn ensure_history(self: &Arc<Self>, channel_id: Snowflake) -> Option<JoinHandle<()>> {
        let hydrator = self.hydrator.read().clone()?;
        let runtime = Handle::try_current().ok()?;
        if !self.history_requested.insert(channel_id) {
            return None;
        }

        let limit = self.config.history_limit;
        let generation = self.generation();
        let state = Arc::clone(self);

        Some(runtime.spawn(async move {
            tracing::debug!(channel_id = %channel_id, limit, "Hydrating channel history");
            let payloads = match hydrator.fetch_messages(channel_id, limit).await {
                Ok(payloads) => payloads,
                Err(e) => {
                    tracing::warn!(channel_id = %channel_id, error = %e, "History hydration failed");
                    // Allow a later read to try again
                    state.history_requested.remove(&channel_id);
                    return;
                }
            };

            if state.generation() != generation {
                tracing::debug!(channel_id = %channel_id, "Cache rebuilt during history hydration");
                return;
            }

            let request = HydrationRequest::new(EntityKind::Message, Snowflake::default())
                .with_parent(channel_id);
            let mut merged = 0usize;
            for payload in payloads {
                // Messages already cached came from the stream and only get filled
                match state.apply_hydrated(request, payload, None) {
                    Ok(()) => merged += 1,
                    Err(e) => tracing::warn!(channel_id = %channel_id, error = %e, "Hydrated message dropped"),
                }
            }
            tracing::debug!(channel_id = %channel_id, merged, "Channel history hydrated");
        }))
    }

    /// Cached messages of a channel, oldest first.
    ///
    /// The first read of a channel also starts a background history fetch;
    /// its results arrive as `Created` notifications.
    pub fn channel_messages(self: &Arc<Self>, channel_id: Snowflake) -> Vec<Message> {
        self.ensure_history(channel_id);
        self.cached_messages(channel_id)
    }

    /// Cached user, or a shell that is hydrated in the background
    pub fn resolve_user(self: &Arc<Self>, id: Snowflake) -> User {
        let (user, created) = self.users().get_or_create(id, None);
        if created {
            self.hydrate(HydrationRequest::new(EntityKind::User, id));
        }
        user
    }

    /// Cached channel, or a shell that is hydrated in the background
    pub fn resolve_channel(self: &Arc<Self>, id: Snowflake, guild_id: Option<Snowflake>) -> Channel {
        let (channel, created) = self.channels().get_or_create(id, guild_id);
        if created {
            let mut request = HydrationRequest::new(EntityKind::Channel, id);
            request.parent_id = guild_id;
            self.hydrate(request);
        }
        channel
    }

    /// Cached guild, or a shell that is hydrated in the background
    pub fn resolve_guild(self: &Arc<Self>, id: Snowflake) -> Guild {
        let (guild, created) = self.guilds().get_or_create(id, None);
        if created {
            self.hydrate(HydrationRequest::new(EntityKind::Guild, id));
        }
        guild
    }
}
