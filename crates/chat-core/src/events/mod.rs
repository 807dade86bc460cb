//! Change notifications raised to subscribers

mod client_event;

pub use client_event::{ClientEvent, EventCategories};
