//! Channel dispatch handlers

use std::sync::Arc;

use chat_cache::StateManager;
use chat_core::ChannelPartial;

use super::DispatchResult;

/// Handles CHANNEL_* dispatches
pub struct ChannelHandler;

impl ChannelHandler {
    /// CHANNEL_CREATE and CHANNEL_UPDATE share one merge path.
    ///
    /// A guild the cache has never seen is hydrated in the background.
    pub fn upsert(state: &Arc<StateManager>, partial: &ChannelPartial) -> DispatchResult<()> {
        if let Some(guild_id) = partial.guild_id {
            state.resolve_guild(guild_id);
        }
        let channel = state.upsert_channel(partial, None);
        tracing::trace!(channel_id = %channel.id, guild_id = ?channel.guild_id, "Channel merged");
        Ok(())
    }

    pub fn delete(state: &Arc<StateManager>, partial: &ChannelPartial) -> DispatchResult<()> {
        if state.remove_channel(partial.id).is_none() {
            tracing::debug!(channel_id = %partial.id, "Delete for unknown channel");
        }
        Ok(())
    }
}
