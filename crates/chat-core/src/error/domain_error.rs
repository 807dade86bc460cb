//! Domain errors - error types for the domain layer

use thiserror::Error;

use crate::entities::EntityKind;
use crate::value_objects::SnowflakeParseError;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Decoding Errors
    // =========================================================================
    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: EntityKind, reason: String },

    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error(transparent)]
    InvalidSnowflake(#[from] SnowflakeParseError),

    // =========================================================================
    // Relationship Errors
    // =========================================================================
    #[error("{kind} payload is missing its {parent} reference")]
    MissingParent {
        kind: EntityKind,
        parent: EntityKind,
    },
}

impl DomainError {
    /// Wrap a JSON decoding failure for a payload of the given kind
    pub fn invalid_payload(kind: EntityKind, err: impl std::fmt::Display) -> Self {
        Self::InvalidPayload {
            kind,
            reason: err.to_string(),
        }
    }

    /// Get an error code string for logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload { .. } => "INVALID_PAYLOAD",
            Self::UnknownEntityKind(_) => "UNKNOWN_ENTITY_KIND",
            Self::InvalidSnowflake(_) => "INVALID_SNOWFLAKE",
            Self::MissingParent { .. } => "MISSING_PARENT",
        }
    }

    /// Check if the error came from a malformed payload
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::InvalidPayload { .. } | Self::InvalidSnowflake(_)
        )
    }
}
