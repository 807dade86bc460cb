//! Session controller states

use serde::{Deserialize, Serialize};

/// Where the session controller is in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No connection; terminal after a caller disconnect or a fatal close
    #[default]
    Disconnected,
    /// Opening the physical connection
    Connecting,
    /// Connected; identify sent, waiting for the snapshot
    Identifying,
    /// Session established; heartbeats running
    Steady,
    /// Connected again after a drop; resume sent, waiting for confirmation
    Resuming,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Steady => "steady",
            Self::Resuming => "resuming",
        }
    }

    /// Whether a physical connection is open in this state
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Identifying | Self::Steady | Self::Resuming)
    }

    #[must_use]
    pub const fn is_steady(self) -> bool {
        matches!(self, Self::Steady)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
