// Realtime connection lifecycle

mod backoff;
pub mod manager;

pub use backoff::BackoffPolicy;
pub use manager::{ConnectionManager, ManagerConfig, SyncStatus};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection health as seen by the caller.
///
/// ```text
/// Disconnected ──connect──▶ Connecting ──confirmed──▶ Connected
///                               │  ▲                      │
///                        failure│  │timer         closed/ │
///                               ▼  │              timeout │
///                             Error ──retry──▶ Reconnecting
///                               ▲                         │
///                               └─────────────────────────┘
/// ```
///
/// `Error` with an exhausted retry budget stays put until `connect` or
/// `force_reconnect`. Any state moves to `Disconnected` on `disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Reconnecting,
}

impl ConnectionState {
    /// Connecting or connected; `connect` is a no-op here
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}
