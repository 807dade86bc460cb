//! Concurrent in-memory indices

mod entity_store;
mod members;
mod relations;

pub use entity_store::{EntityStore, Upsert};
pub use members::MemberStore;
pub use relations::RelationIndex;
