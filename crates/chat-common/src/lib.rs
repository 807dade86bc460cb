//! # chat-common
//!
//! Shared utilities for the gateway client: configuration, the caller-facing
//! error type, account tokens, and telemetry.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{Token, TokenType};
pub use config::{
    ClientConfig, ConfigError, Environment, GatewayConfig, HeartbeatConfig, HydrationConfig,
    ReconnectConfig,
};
pub use error::{ClientError, ClientResult};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
