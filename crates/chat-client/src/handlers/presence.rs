//! Presence, typing and current-user dispatch handlers

use std::sync::Arc;

use chat_cache::StateManager;
use chat_core::{PresencePartial, UserPartial};

use super::DispatchResult;
use crate::events::TypingStartEvent;

/// Handles PRESENCE_UPDATE, TYPING_START and USER_UPDATE
pub struct PresenceHandler;

impl PresenceHandler {
    pub fn presence(state: &Arc<StateManager>, presence: &PresencePartial) -> DispatchResult<()> {
        let user = state.apply_presence(presence);
        tracing::trace!(user_id = %user.id, status = %user.status, "Presence updated");
        Ok(())
    }

    /// TYPING_START advances the typist's activity and raises a typing event
    pub fn typing(state: &Arc<StateManager>, event: &TypingStartEvent) -> DispatchResult<()> {
        if let (Some(guild_id), Some(member)) = (event.guild_id, &event.member) {
            state.upsert_member(guild_id, member);
        } else {
            state.resolve_user(event.user_id);
        }
        state.resolve_channel(event.channel_id, event.guild_id);
        state.record_typing(event.channel_id, event.user_id, event.started_at());
        Ok(())
    }

    /// USER_UPDATE always describes the connected account
    pub fn user_update(state: &Arc<StateManager>, partial: &UserPartial) -> DispatchResult<()> {
        state.update_current_user(partial);
        Ok(())
    }
}
