//! Client-facing error type

mod client_error;

pub use client_error::{ClientError, ClientResult};
