//! Message dispatch handlers

use std::sync::Arc;

use chat_cache::StateManager;
use chat_core::MessagePartial;

use super::DispatchResult;
use crate::events::{MessageDeleteBulkEvent, MessageDeleteEvent};

/// Handles MESSAGE_* dispatches
pub struct MessageHandler;

impl MessageHandler {
    /// MESSAGE_CREATE and MESSAGE_UPDATE.
    ///
    /// Updates may carry only the changed fields; the cache's staleness
    /// guard keeps an older edit from overwriting a newer one.
    pub fn upsert(state: &Arc<StateManager>, partial: &MessagePartial) -> DispatchResult<()> {
        if let Some(channel_id) = partial.channel_id {
            state.resolve_channel(channel_id, partial.guild_id);
        }
        let message = state.upsert_message(partial);
        tracing::trace!(
            message_id = %message.id,
            channel_id = ?message.channel_id,
            "Message merged"
        );
        Ok(())
    }

    pub fn delete(state: &Arc<StateManager>, event: &MessageDeleteEvent) -> DispatchResult<()> {
        if state.remove_message(event.id).is_none() {
            tracing::trace!(message_id = %event.id, "Delete for uncached message");
        }
        Ok(())
    }

    pub fn delete_bulk(
        state: &Arc<StateManager>,
        event: &MessageDeleteBulkEvent,
    ) -> DispatchResult<()> {
        let removed = event
            .ids
            .iter()
            .filter(|id| state.remove_message(**id).is_some())
            .count();
        tracing::debug!(
            channel_id = %event.channel_id,
            requested = event.ids.len(),
            removed,
            "Bulk message delete"
        );
        Ok(())
    }
}
