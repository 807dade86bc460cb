//! Per-route rate limit buckets
//!
//! The server reports remaining quota per route in response headers.
//! A bucket that reached zero holds further requests on that route until
//! its reset time.

use std::time::Duration;

use dashmap::DashMap;
use reqwest::header::HeaderMap;
use tokio::time::Instant;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_AFTER_HEADER: &str = "x-ratelimit-reset-after";
const RETRY_AFTER_HEADER: &str = "retry-after";

/// One request path plus the bucket it counts against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub bucket: String,
}

impl Route {
    fn new(path: String, bucket: impl Into<String>) -> Self {
        Self {
            path,
            bucket: bucket.into(),
        }
    }

    pub fn user(id: impl std::fmt::Display) -> Self {
        Self::new(format!("/users/{id}"), "users")
    }

    pub fn guild(id: impl std::fmt::Display) -> Self {
        Self::new(format!("/guilds/{id}"), format!("guilds/{id}"))
    }

    pub fn guild_roles(guild_id: impl std::fmt::Display) -> Self {
        Self::new(
            format!("/guilds/{guild_id}/roles"),
            format!("guilds/{guild_id}/roles"),
        )
    }

    pub fn channel(id: impl std::fmt::Display) -> Self {
        Self::new(format!("/channels/{id}"), format!("channels/{id}"))
    }

    pub fn channel_message(
        channel_id: impl std::fmt::Display,
        message_id: impl std::fmt::Display,
    ) -> Self {
        Self::new(
            format!("/channels/{channel_id}/messages/{message_id}"),
            format!("channels/{channel_id}/messages"),
        )
    }

    pub fn channel_messages(channel_id: impl std::fmt::Display, limit: u8) -> Self {
        Self::new(
            format!("/channels/{channel_id}/messages?limit={limit}"),
            format!("channels/{channel_id}/messages"),
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

/// Quota reported by the server, keyed by bucket
#[derive(Debug, Default)]
pub struct RouteBuckets {
    buckets: DashMap<String, BucketState>,
}

impl RouteBuckets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a request on `bucket` must wait, if at all
    pub fn delay_for(&self, bucket: &str) -> Option<Duration> {
        let state = *self.buckets.get(bucket)?;
        if state.remaining > 0 {
            return None;
        }
        let now = Instant::now();
        if state.resets_at <= now {
            self.buckets.remove(bucket);
            return None;
        }
        Some(state.resets_at - now)
    }

    /// Record the quota headers of a response
    pub fn update(&self, bucket: &str, headers: &HeaderMap) {
        let remaining = header_str(headers, REMAINING_HEADER).and_then(|v| v.parse::<u32>().ok());
        let reset_after = header_str(headers, RESET_AFTER_HEADER).and_then(parse_seconds);

        if let (Some(remaining), Some(reset_after)) = (remaining, reset_after) {
            self.buckets.insert(
                bucket.to_string(),
                BucketState {
                    remaining,
                    resets_at: Instant::now() + reset_after,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Wait requested by a 429 response
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, RETRY_AFTER_HEADER)
        .and_then(parse_seconds)
        .or_else(|| header_str(headers, RESET_AFTER_HEADER).and_then(parse_seconds))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Seconds, possibly fractional ("1.25")
fn parse_seconds(value: &str) -> Option<Duration> {
    let seconds = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}
