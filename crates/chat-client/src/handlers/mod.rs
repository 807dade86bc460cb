//! Dispatch event handlers
//!
//! Routes each dispatch by event name to the handler that folds it into
//! the cache. Handlers run on the receive path, one event at a time, in
//! stream order.

mod channel;
mod error;
mod guild;
mod member;
mod message;
mod presence;

pub use channel::ChannelHandler;
pub use error::{DispatchError, DispatchResult};
pub use guild::GuildHandler;
pub use member::MemberHandler;
pub use message::MessageHandler;
pub use presence::PresenceHandler;

use std::sync::Arc;

use chat_cache::{ReadySnapshot, StateManager};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::events::GatewayEventType;

fn decode<T: DeserializeOwned>(event: GatewayEventType, data: Option<Value>) -> DispatchResult<T> {
    let data = data.ok_or(DispatchError::MissingPayload(event))?;
    serde_json::from_value(data).map_err(|source| DispatchError::Decode { event, source })
}

/// Routes dispatch events into the state manager
#[derive(Clone)]
pub struct EventDispatcher {
    state: Arc<StateManager>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(state: Arc<StateManager>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// Decode the initial snapshot and rebuild the cache from it
    pub fn handle_ready(&self, data: Option<Value>) -> DispatchResult<ReadySnapshot> {
        let snapshot: ReadySnapshot = decode(GatewayEventType::Ready, data)?;
        self.state.apply_ready(&snapshot);
        Ok(snapshot)
    }

    /// Handle one dispatch event.
    ///
    /// Unknown event names are logged and dropped.
    pub fn dispatch(&self, event_name: &str, data: Option<Value>) -> DispatchResult<()> {
        let Some(event) = GatewayEventType::parse(event_name) else {
            tracing::debug!(event = %event_name, "Unknown dispatch event dropped");
            return Ok(());
        };

        tracing::trace!(event = %event, "Dispatching");
        let state = &self.state;

        match event {
            GatewayEventType::Ready => self.handle_ready(data).map(|_| ()),
            GatewayEventType::Resumed => Ok(()),

            GatewayEventType::GuildCreate => GuildHandler::create(state, &decode(event, data)?),
            GatewayEventType::GuildUpdate => GuildHandler::update(state, &decode(event, data)?),
            GatewayEventType::GuildDelete => GuildHandler::delete(state, &decode(event, data)?),
            GatewayEventType::GuildRoleCreate | GatewayEventType::GuildRoleUpdate => {
                GuildHandler::upsert_role(state, &decode(event, data)?)
            }
            GatewayEventType::GuildRoleDelete => {
                GuildHandler::delete_role(state, &decode(event, data)?)
            }

            GatewayEventType::ChannelCreate | GatewayEventType::ChannelUpdate => {
                ChannelHandler::upsert(state, &decode(event, data)?)
            }
            GatewayEventType::ChannelDelete => ChannelHandler::delete(state, &decode(event, data)?),

            GatewayEventType::MessageCreate | GatewayEventType::MessageUpdate => {
                MessageHandler::upsert(state, &decode(event, data)?)
            }
            GatewayEventType::MessageDelete => MessageHandler::delete(state, &decode(event, data)?),
            GatewayEventType::MessageDeleteBulk => {
                MessageHandler::delete_bulk(state, &decode(event, data)?)
            }

            GatewayEventType::GuildMemberAdd | GatewayEventType::GuildMemberUpdate => {
                MemberHandler::upsert(state, event, &decode(event, data)?)
            }
            GatewayEventType::GuildMemberRemove => {
                MemberHandler::remove(state, &decode(event, data)?)
            }
            GatewayEventType::GuildMembersChunk => {
                MemberHandler::chunk(state, &decode(event, data)?)
            }

            GatewayEventType::PresenceUpdate => {
                PresenceHandler::presence(state, &decode(event, data)?)
            }
            GatewayEventType::TypingStart => PresenceHandler::typing(state, &decode(event, data)?),
            GatewayEventType::UserUpdate => {
                PresenceHandler::user_update(state, &decode(event, data)?)
            }
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}
