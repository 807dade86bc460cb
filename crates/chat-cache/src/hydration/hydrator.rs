//! Hydration gateway interface

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chat_core::{DomainError, EntityKind, Snowflake};
use serde_json::Value;

/// One lookup: which entity, and its container when the API needs it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HydrationRequest {
    pub kind: EntityKind,
    pub id: Snowflake,
    pub parent_id: Option<Snowflake>,
}

impl HydrationRequest {
    #[must_use]
    pub const fn new(kind: EntityKind, id: Snowflake) -> Self {
        Self {
            kind,
            id,
            parent_id: None,
        }
    }

    #[must_use]
    pub const fn with_parent(mut self, parent_id: Snowflake) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

impl fmt::Display for HydrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent_id {
            Some(parent) => write!(f, "{} {} (in {})", self.kind, self.id, parent),
            None => write!(f, "{} {}", self.kind, self.id),
        }
    }
}

/// Errors from a hydration lookup
///
/// "Not found" is not an error: lookups return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum HydrationError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("{0} cannot be hydrated without a parent ID")]
    MissingParent(EntityKind),

    #[error(transparent)]
    Decode(#[from] DomainError),
}

/// Result type for hydration lookups
pub type HydrationResult<T> = Result<T, HydrationError>;

/// Request/response client used to fill gaps in the cache.
///
/// Implementations own rate limiting. Payloads are returned undecoded;
/// the cache decodes them into partials for its kind.
#[async_trait]
pub trait Hydrator: Send + Sync + 'static {
    /// Fetch a single entity; `Ok(None)` when the server does not know it
    async fn fetch(&self, request: HydrationRequest) -> HydrationResult<Option<Value>>;

    /// Fetch the most recent messages of a channel, newest first
    async fn fetch_messages(&self, channel_id: Snowflake, limit: u8) -> HydrationResult<Vec<Value>>;
}
