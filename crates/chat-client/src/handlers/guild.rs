//! Guild and role dispatch handlers

use std::sync::Arc;

use chat_cache::StateManager;
use chat_core::{GuildPartial, GuildSnapshot};

use super::DispatchResult;
use crate::events::{GuildDeleteEvent, GuildRoleDeleteEvent, GuildRoleEvent};

/// Handles GUILD_* and GUILD_ROLE_* dispatches
pub struct GuildHandler;

impl GuildHandler {
    /// GUILD_CREATE: a full guild payload, also sent when an outage ends
    pub fn create(state: &Arc<StateManager>, snapshot: &GuildSnapshot) -> DispatchResult<()> {
        let guild = state.apply_guild_snapshot(snapshot);
        tracing::debug!(guild_id = %guild.id, name = ?guild.name, "Guild available");
        Ok(())
    }

    pub fn update(state: &Arc<StateManager>, partial: &GuildPartial) -> DispatchResult<()> {
        state.upsert_guild(partial);
        Ok(())
    }

    /// GUILD_DELETE: an outage keeps the guild cached, a departure removes it
    pub fn delete(state: &Arc<StateManager>, event: &GuildDeleteEvent) -> DispatchResult<()> {
        if event.is_outage() {
            tracing::info!(guild_id = %event.id, "Guild unavailable");
            state.mark_guild_unavailable(event.id);
        } else if state.remove_guild(event.id).is_none() {
            tracing::debug!(guild_id = %event.id, "Delete for unknown guild");
        }
        Ok(())
    }

    pub fn upsert_role(state: &Arc<StateManager>, event: &GuildRoleEvent) -> DispatchResult<()> {
        state.resolve_guild(event.guild_id);
        state.upsert_role(event.guild_id, &event.role);
        Ok(())
    }

    pub fn delete_role(
        state: &Arc<StateManager>,
        event: &GuildRoleDeleteEvent,
    ) -> DispatchResult<()> {
        state.remove_role(event.role_id);
        Ok(())
    }
}
