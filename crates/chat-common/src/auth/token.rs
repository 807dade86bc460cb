//! Account tokens
//!
//! The token is sent raw in the identify frame and with a scheme prefix
//! in the `Authorization` header of hydration requests. It never appears
//! in logs: both `Debug` and `Display` redact it.

use std::fmt;

/// Token scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenType {
    #[default]
    Bot,
    Bearer,
}

impl TokenType {
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Bot => "Bot",
            Self::Bearer => "Bearer",
        }
    }
}

/// Account credential
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    token_type: TokenType,
    secret: String,
}

impl Token {
    /// Create a token of an explicit type
    pub fn new(token_type: TokenType, secret: impl Into<String>) -> Self {
        Self {
            token_type,
            secret: secret.into(),
        }
    }

    /// Parse a token, honouring an optional `Bot ` or `Bearer ` prefix.
    ///
    /// Unprefixed tokens are treated as bot tokens.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(secret) = raw.strip_prefix("Bot ") {
            Self::new(TokenType::Bot, secret.trim())
        } else if let Some(secret) = raw.strip_prefix("Bearer ") {
            Self::new(TokenType::Bearer, secret.trim())
        } else {
            Self::new(TokenType::Bot, raw)
        }
    }

    #[inline]
    pub const fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Raw secret, as presented in the identify frame
    #[inline]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Value for the HTTP `Authorization` header
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type.scheme(), self.secret)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <redacted>", self.token_type.scheme())
    }
}
