//! # chat-core
//!
//! Domain layer for the gateway client: snowflake IDs, cached entity
//! records with their partial payloads, merge rules, and the change
//! notifications raised to subscribers.
//! This crate has zero dependencies on infrastructure (sockets, HTTP, runtime).

pub mod entities;
pub mod error;
pub mod events;
pub mod merge;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    Channel, ChannelPartial, ChannelType, Entity, EntityKind, EntitySnapshot, Guild, GuildPartial,
    GuildSnapshot, Member, MemberPartial, Message, MessagePartial, PresencePartial, Role,
    RolePartial, User, UserFlags, UserPartial, UserStatus,
};
pub use error::DomainError;
pub use events::{ClientEvent, EventCategories};
pub use value_objects::{Snowflake, SnowflakeParseError};
