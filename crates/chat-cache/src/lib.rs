//! # chat-cache
//!
//! Local mirror of server-side state for the gateway client.
//!
//! ## Features
//!
//! - **Entity Stores**: One concurrent index per entity kind, merged field by field
//! - **Relationships**: Guild/channel/role/message edges kept as ID sets
//! - **Memberships**: Per-guild user attributes keyed by (guild, user)
//! - **Hydration**: Detached lookups for data the stream did not supply
//! - **Notifications**: A single broadcast stream of [`ClientEvent`]s
//!
//! ## Example
//!
//! ```ignore
//! use chat_cache::{CacheConfig, StateManager};
//!
//! let state = StateManager::new_shared(CacheConfig::default());
//! let mut events = state.subscribe();
//!
//! state.upsert_channel(&partial, Some(guild_id));
//! let channel = state.channel(channel_id);
//! ```
//!
//! [`ClientEvent`]: chat_core::ClientEvent

pub mod hydration;
pub mod state;
pub mod store;

// Re-export hydration types
pub use hydration::{HydrationError, HydrationRequest, HydrationResult, Hydrator};

// Re-export state types
pub use state::{CacheConfig, ReadySnapshot, StateManager};

// Re-export store types
pub use store::{EntityStore, MemberStore, RelationIndex, Upsert};
