//! Dispatch error types

use thiserror::Error;

use crate::events::GatewayEventType;
use crate::transport::TransportError;

/// Why a single inbound frame was dropped.
///
/// None of these end the session; the receive loop logs them and moves on.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The frame is not a valid gateway envelope
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The frame could not be reassembled
    #[error(transparent)]
    Frame(#[from] TransportError),

    /// A dispatch arrived without its data
    #[error("{0} dispatch carried no payload")]
    MissingPayload(GatewayEventType),

    /// The payload does not match the event's shape
    #[error("Invalid {event} payload: {source}")]
    Decode {
        event: GatewayEventType,
        #[source]
        source: serde_json::Error,
    },

    /// A required reference is absent from an otherwise valid payload
    #[error("{event} payload is missing {field}")]
    MissingField {
        event: GatewayEventType,
        field: &'static str,
    },
}

impl DispatchError {
    /// Get an error code string for logs
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedFrame(_) => "MALFORMED_FRAME",
            Self::Frame(_) => "INVALID_FRAME",
            Self::MissingPayload(_) => "MISSING_PAYLOAD",
            Self::Decode { .. } => "DECODE_ERROR",
            Self::MissingField { .. } => "MISSING_FIELD",
        }
    }
}

/// Dispatch result type
pub type DispatchResult<T> = Result<T, DispatchError>;
