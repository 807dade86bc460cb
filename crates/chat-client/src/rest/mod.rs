//! REST hydration client
//!
//! Implements the cache's [`Hydrator`](chat_cache::Hydrator) interface
//! against the HTTP API.

mod buckets;
mod hydrator;

pub use buckets::{retry_after, Route, RouteBuckets};
pub use hydrator::RestHydrator;
