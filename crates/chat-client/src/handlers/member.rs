//! Guild membership dispatch handlers

use std::sync::Arc;

use chat_cache::StateManager;
use chat_core::MemberPartial;

use super::{DispatchError, DispatchResult};
use crate::events::{GatewayEventType, MemberRemoveEvent, MembersChunkEvent};

/// Handles GUILD_MEMBER_* dispatches
pub struct MemberHandler;

impl MemberHandler {
    /// GUILD_MEMBER_ADD and GUILD_MEMBER_UPDATE
    pub fn upsert(
        state: &Arc<StateManager>,
        event: GatewayEventType,
        partial: &MemberPartial,
    ) -> DispatchResult<()> {
        let guild_id = partial.guild_id.ok_or(DispatchError::MissingField {
            event,
            field: "guild_id",
        })?;

        state.resolve_guild(guild_id);
        let member = state.upsert_member(guild_id, partial);
        if event == GatewayEventType::GuildMemberAdd {
            if let Some(joined_at) = member.joined_at {
                state.record_activity(member.user_id, joined_at);
            }
        }
        Ok(())
    }

    /// GUILD_MEMBER_REMOVE drops the membership, never the user record
    pub fn remove(state: &Arc<StateManager>, event: &MemberRemoveEvent) -> DispatchResult<()> {
        state.upsert_user(&event.user);
        if state.remove_member(event.guild_id, event.user.id).is_none() {
            tracing::trace!(
                guild_id = %event.guild_id,
                user_id = %event.user.id,
                "Remove for uncached membership"
            );
        }
        Ok(())
    }

    /// GUILD_MEMBERS_CHUNK, one page of a Request Guild Members reply
    pub fn chunk(state: &Arc<StateManager>, event: &MembersChunkEvent) -> DispatchResult<()> {
        for member in &event.members {
            state.upsert_member(event.guild_id, member);
        }
        for presence in &event.presences {
            state.apply_presence(presence);
        }
        tracing::debug!(
            guild_id = %event.guild_id,
            chunk = event.chunk_index + 1,
            of = event.chunk_count,
            members = event.members.len(),
            "Member chunk applied"
        );
        Ok(())
    }
}
