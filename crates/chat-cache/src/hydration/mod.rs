//! On-demand lookups for state the stream did not supply
//!
//! The cache calls a [`Hydrator`] when an event references data it has
//! never seen, or when a channel's history is first read. Requests run
//! as detached tasks; their results go through the same upsert path as
//! stream events.

mod hydrator;
mod worker;

pub use hydrator::{HydrationError, HydrationRequest, HydrationResult, Hydrator};
