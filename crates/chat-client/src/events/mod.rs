//! Gateway events
//!
//! Dispatch event names and the payloads specific to them.

mod event_types;
mod payloads;

pub use event_types::GatewayEventType;
pub use payloads::{
    GuildDeleteEvent, GuildRoleDeleteEvent, GuildRoleEvent, MemberRemoveEvent,
    MembersChunkEvent, MessageDeleteBulkEvent, MessageDeleteEvent, TypingStartEvent,
};
