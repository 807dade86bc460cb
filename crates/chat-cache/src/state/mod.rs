//! State manager - the authoritative local mirror

mod manager;
mod snapshot;

pub use manager::{CacheConfig, StateManager};
pub use snapshot::ReadySnapshot;
