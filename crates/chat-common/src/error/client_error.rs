//! Client error types
//!
//! The only error type surfaced to callers of the gateway client. Faults
//! the client recovers from on its own (socket resets, dropped frames,
//! failed lookups) are logged and never reach this type.

use std::fmt;
use std::time::Duration;

use chat_core::DomainError;

use crate::config::ConfigError;

/// Client-wide error type
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    // Authentication errors
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed {
        close_code: Option<u16>,
        reason: String,
    },

    // Session lifecycle errors
    #[error("Client is already connected")]
    AlreadyConnected,

    #[error("Client is not connected")]
    NotConnected,

    #[error("Timed out after {0:?} waiting for the session to become ready")]
    ConnectTimeout(Duration),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    // Hydration errors
    #[error("Hydration error: {0}")]
    Hydration(String),

    // Internal errors
    #[error("Internal client error")]
    Internal(#[source] anyhow::Error),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Get error code for logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::AlreadyConnected => "ALREADY_CONNECTED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::ConnectTimeout(_) => "CONNECT_TIMEOUT",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Hydration(_) => "HYDRATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Domain(e) => e.code(),
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Errors that waiting will not fix; the client stops retrying
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::Config(_) | Self::SessionClosed(_)
        )
    }

    /// Errors the reconnect loop or a later call may recover from
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ConnectTimeout(_) | Self::Hydration(_)
        )
    }

    /// Create a transport error from any displayable cause
    #[must_use]
    pub fn transport(cause: impl fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
