//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when
//! present), or builds it in code starting from [`ClientConfig::new`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::Token;

/// Main client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub token: Token,
    pub env: Environment,
    pub gateway: GatewayConfig,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    pub hydration: HydrationConfig,
    /// Capacity of the subscriber notification channel
    pub event_buffer: usize,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            _ => Err(ConfigError::InvalidValue("CHAT_ENV", s.to_string())),
        }
    }
}

/// Streaming connection settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    /// How long `connect` waits for the session to become ready
    pub connection_timeout_ms: u64,
    /// Largest outbound fragment written to the socket
    pub send_chunk_size: usize,
    /// Member count above which guilds arrive without offline members
    pub large_threshold: u32,
    pub intents: Option<u64>,
    /// `[shard_id, shard_count]` sent on identify; `None` for an unsharded session
    pub shard: Option<[u32; 2]>,
}

impl GatewayConfig {
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

/// Reconnect loop timing
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait before the first attempt after an unexpected drop
    pub delay_ms: u64,
    /// Wait after an attempt that itself failed
    pub failed_delay_ms: u64,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl ReconnectConfig {
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    #[must_use]
    pub fn failed_delay(&self) -> Duration {
        Duration::from_millis(self.failed_delay_ms)
    }
}

/// Heartbeat settings
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Skip a scheduled beat if one went out within this window
    pub jitter_ms: u64,
}

impl HeartbeatConfig {
    #[must_use]
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

/// Request/response hydration settings
#[derive(Debug, Clone)]
pub struct HydrationConfig {
    pub api_base_url: String,
    /// Client-side ceiling on outgoing requests
    pub requests_per_second: u32,
    /// Messages fetched when a channel's history is hydrated
    pub history_limit: u8,
    /// Attempts per request when the server answers 429
    pub max_retries: u32,
}

// Default value functions
fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=10&encoding=json".to_string()
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_failed_reconnect_delay_ms() -> u64 {
    10_000
}

fn default_heartbeat_jitter_ms() -> u64 {
    1_000
}

fn default_send_chunk_size() -> usize {
    4 * 1024
}

fn default_large_threshold() -> u32 {
    250
}

fn default_event_buffer() -> usize {
    1024
}

fn default_requests_per_second() -> u32 {
    40
}

fn default_history_limit() -> u8 {
    50
}

fn default_max_retries() -> u32 {
    3
}

impl ClientConfig {
    /// Configuration with defaults for everything except the token
    #[must_use]
    pub fn new(token: Token) -> Self {
        Self {
            token,
            env: Environment::default(),
            gateway: GatewayConfig {
                url: default_gateway_url(),
                connection_timeout_ms: default_connection_timeout_ms(),
                send_chunk_size: default_send_chunk_size(),
                large_threshold: default_large_threshold(),
                intents: None,
                shard: None,
            },
            reconnect: ReconnectConfig {
                delay_ms: default_reconnect_delay_ms(),
                failed_delay_ms: default_failed_reconnect_delay_ms(),
                max_attempts: None,
            },
            heartbeat: HeartbeatConfig {
                jitter_ms: default_heartbeat_jitter_ms(),
            },
            hydration: HydrationConfig {
                api_base_url: default_api_base_url(),
                requests_per_second: default_requests_per_second(),
                history_limit: default_history_limit(),
                max_retries: default_max_retries(),
            },
            event_buffer: default_event_buffer(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `CHAT_TOKEN` is missing or a variable fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("CHAT_TOKEN").ok_or(ConfigError::MissingVar("CHAT_TOKEN"))?;
        let mut config = Self::new(Token::parse(&token));

        if let Some(env) = lookup("CHAT_ENV") {
            config.env = env.parse()?;
        }

        if let Some(url) = lookup("CHAT_GATEWAY_URL") {
            config.gateway.url = url;
        }
        if let Some(url) = lookup("CHAT_API_URL") {
            config.hydration.api_base_url = url;
        }

        let parse = |name: &'static str| parse_var(&lookup, name);

        if let Some(v) = parse("CHAT_CONNECTION_TIMEOUT_MS")? {
            config.gateway.connection_timeout_ms = v;
        }
        if let Some(v) = parse("CHAT_SEND_CHUNK_SIZE")? {
            config.gateway.send_chunk_size = v as usize;
        }
        if let Some(v) = parse("CHAT_LARGE_THRESHOLD")? {
            config.gateway.large_threshold = v as u32;
        }
        config.gateway.intents = parse("CHAT_INTENTS")?;
        config.gateway.shard = match (parse("CHAT_SHARD_ID")?, parse("CHAT_SHARD_COUNT")?) {
            (None, None) => None,
            (Some(id), Some(count)) => Some([id as u32, count as u32]),
            (Some(_), None) => return Err(ConfigError::MissingVar("CHAT_SHARD_COUNT")),
            (None, Some(_)) => return Err(ConfigError::MissingVar("CHAT_SHARD_ID")),
        };

        if let Some(v) = parse("CHAT_RECONNECT_DELAY_MS")? {
            config.reconnect.delay_ms = v;
        }
        if let Some(v) = parse("CHAT_FAILED_RECONNECT_DELAY_MS")? {
            config.reconnect.failed_delay_ms = v;
        }
        config.reconnect.max_attempts = parse("CHAT_MAX_RECONNECT_ATTEMPTS")?.map(|v| v as u32);

        if let Some(v) = parse("CHAT_HEARTBEAT_JITTER_MS")? {
            config.heartbeat.jitter_ms = v;
        }

        if let Some(v) = parse("CHAT_HYDRATION_RPS")? {
            config.hydration.requests_per_second = v as u32;
        }
        if let Some(v) = parse("CHAT_HISTORY_LIMIT")? {
            config.hydration.history_limit = u8::try_from(v)
                .map_err(|_| ConfigError::InvalidValue("CHAT_HISTORY_LIMIT", v.to_string()))?;
        }
        if let Some(v) = parse("CHAT_EVENT_BUFFER")? {
            config.event_buffer = v as usize;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.send_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHAT_SEND_CHUNK_SIZE", "0".into()));
        }
        if self.hydration.requests_per_second == 0 {
            return Err(ConfigError::InvalidValue("CHAT_HYDRATION_RPS", "0".into()));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::InvalidValue("CHAT_EVENT_BUFFER", "0".into()));
        }
        if let Some([id, count]) = self.gateway.shard {
            if id >= count {
                return Err(ConfigError::InvalidValue("CHAT_SHARD_ID", format!("{id} of {count}")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway.url = url.into();
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.hydration.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_reconnect_delays(mut self, delay: Duration, failed_delay: Duration) -> Self {
        self.reconnect.delay_ms = delay.as_millis() as u64;
        self.reconnect.failed_delay_ms = failed_delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.gateway.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_heartbeat_jitter(mut self, jitter: Duration) -> Self {
        self.heartbeat.jitter_ms = jitter.as_millis() as u64;
        self
    }

    /// Identify as shard `id` of `count`
    #[must_use]
    pub fn with_shard(mut self, id: u32, count: u32) -> Self {
        self.gateway.shard = Some([id, count]);
        self
    }

    #[must_use]
    pub fn with_send_chunk_size(mut self, size: usize) -> Self {
        self.gateway.send_chunk_size = size;
        self
    }
}

fn parse_var<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue(name, raw))
        })
        .transpose()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
