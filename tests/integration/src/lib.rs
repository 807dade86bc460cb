//! Integration test utilities for the gateway client
//!
//! A scripted transport stands in for the gateway so tests can play the
//! server side frame by frame, and a static hydrator answers lookups
//! from canned payloads.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
