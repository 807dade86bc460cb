//! Hydration over the REST API

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_cache::{HydrationError, HydrationRequest, HydrationResult, Hydrator};
use chat_common::ClientConfig;
use chat_core::{EntityKind, Snowflake};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::Value;

use super::buckets::{retry_after, Route, RouteBuckets};

/// Wait used when a 429 carries no usable retry hint
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Fetches entities the gateway stream did not supply.
///
/// Every request passes a global client-side limiter and then the
/// per-route bucket the server last reported. 429 responses are retried
/// after the advertised wait, up to `max_retries` times.
pub struct RestHydrator {
    client: reqwest::Client,
    base_url: String,
    authorization: String,
    limiter: DefaultDirectRateLimiter,
    buckets: RouteBuckets,
    max_retries: u32,
}

impl RestHydrator {
    pub fn new(config: &ClientConfig) -> HydrationResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(config.gateway.connection_timeout())
            .build()
            .map_err(|e| HydrationError::Transport(e.to_string()))?;

        let per_second =
            NonZeroU32::new(config.hydration.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: config.hydration.api_base_url.trim_end_matches('/').to_string(),
            authorization: config.token.authorization(),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            buckets: RouteBuckets::new(),
            max_retries: config.hydration.max_retries,
        })
    }

    pub fn new_shared(config: &ClientConfig) -> HydrationResult<Arc<Self>> {
        Self::new(config).map(Arc::new)
    }

    pub fn buckets(&self) -> &RouteBuckets {
        &self.buckets
    }

    /// GET a route; `Ok(None)` on 404
    async fn get(&self, route: &Route) -> HydrationResult<Option<Value>> {
        let url = format!("{}{}", self.base_url, route.path);
        let mut attempt = 0u32;

        loop {
            if let Some(wait) = self.buckets.delay_for(&route.bucket) {
                tracing::debug!(bucket = %route.bucket, wait_ms = wait.as_millis() as u64, "Route bucket exhausted, waiting");
                tokio::time::sleep(wait).await;
            }
            self.limiter.until_ready().await;

            tracing::trace!(url = %url, attempt, "Hydration request");
            let response = self
                .client
                .get(&url)
                .header(AUTHORIZATION, &self.authorization)
                .send()
                .await
                .map_err(|e| HydrationError::Transport(e.to_string()))?;

            self.buckets.update(&route.bucket, response.headers());
            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(response.headers()).unwrap_or(DEFAULT_RETRY_AFTER);
                attempt += 1;
                if attempt > self.max_retries {
                    tracing::warn!(url = %url, attempts = attempt, "Rate limited, giving up");
                    return Err(HydrationError::RateLimited { retry_after: wait });
                }
                tracing::warn!(
                    url = %url,
                    attempt,
                    retry_after_ms = wait.as_millis() as u64,
                    "Rate limited, retrying"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(HydrationError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            return response
                .json::<Value>()
                .await
                .map(Some)
                .map_err(|e| HydrationError::Transport(e.to_string()));
        }
    }
}

fn require_parent(request: &HydrationRequest) -> HydrationResult<Snowflake> {
    request
        .parent_id
        .ok_or(HydrationError::MissingParent(request.kind))
}

/// Pick one role out of a guild's role list
fn find_role(roles: Value, role_id: Snowflake) -> Option<Value> {
    let Value::Array(roles) = roles else {
        return None;
    };
    let wanted = role_id.to_string();
    roles
        .into_iter()
        .find(|role| role.get("id").and_then(Value::as_str) == Some(wanted.as_str()))
}

#[async_trait]
impl Hydrator for RestHydrator {
    async fn fetch(&self, request: HydrationRequest) -> HydrationResult<Option<Value>> {
        match request.kind {
            EntityKind::User => self.get(&Route::user(request.id)).await,
            EntityKind::Guild => self.get(&Route::guild(request.id)).await,
            EntityKind::Channel => self.get(&Route::channel(request.id)).await,
            EntityKind::Role => {
                let guild_id = require_parent(&request)?;
                let roles = self.get(&Route::guild_roles(guild_id)).await?;
                Ok(roles.and_then(|roles| find_role(roles, request.id)))
            }
            EntityKind::Message => {
                let channel_id = require_parent(&request)?;
                self.get(&Route::channel_message(channel_id, request.id))
                    .await
            }
        }
    }

    async fn fetch_messages(&self, channel_id: Snowflake, limit: u8) -> HydrationResult<Vec<Value>> {
        match self.get(&Route::channel_messages(channel_id, limit)).await? {
            Some(Value::Array(messages)) => Ok(messages),
            Some(other) => Err(HydrationError::Status {
                status: 200,
                body: format!("expected a message list, got {other}"),
            }),
            None => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for RestHydrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestHydrator")
            .field("base_url", &self.base_url)
            .field("buckets", &self.buckets.len())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
