// Realtime change-feed seam

mod memory;
mod nats;

pub use memory::{MemoryRealtime, SubscribeOutcome};
pub use nats::{NatsRealtime, NatsRealtimeConfig};

use crate::record::GameSnapshot;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Identifies one live subscription within a realtime service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Row filter scoping a channel to a single game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFilter {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl ChannelFilter {
    /// Filter on `<table>.<column> = <value>`
    pub fn new(table: impl Into<String>, column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    /// PostgREST notation, e.g. `id=eq.game-1`
    pub fn expression(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    /// Whether a snapshot belongs to this filter
    pub fn matches(&self, snapshot: &GameSnapshot) -> bool {
        snapshot.field_as_string(&self.column).as_deref() == Some(self.value.as_str())
    }
}

/// Subscription status as reported by the realtime backend
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Subscribed => write!(f, "SUBSCRIBED"),
            ChannelStatus::ChannelError(msg) => write!(f, "CHANNEL_ERROR: {}", msg),
            ChannelStatus::TimedOut => write!(f, "TIMED_OUT"),
            ChannelStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Everything a subscription delivers, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Status(ChannelStatus),
    Change(GameSnapshot),
}

/// A live subscription: its handle plus the stream of events.
///
/// The event stream ending without a status is treated like `Closed`.
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Realtime subscription service.
///
/// Implementations push a `Status(Subscribed)` once the backend confirms the
/// channel and then `Change` events for every update of the filtered row.
#[async_trait]
pub trait RealtimeService: Send + Sync {
    /// Open a subscription on `channel` restricted by `filter`.
    ///
    /// An `Err` means the request itself could not be made. Backend-side
    /// rejections arrive later as a status event.
    async fn subscribe(&self, channel: &str, filter: &ChannelFilter) -> Result<Subscription>;

    /// Release a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_expression() {
        let filter = ChannelFilter::new("games", "id", "game-7");
        assert_eq!(filter.expression(), "id=eq.game-7");
    }

    #[test]
    fn test_filter_matches() {
        let filter = ChannelFilter::new("games", "id", "42");

        assert!(filter.matches(&GameSnapshot::new(json!({"id": 42, "turn": 1}))));
        assert!(filter.matches(&GameSnapshot::new(json!({"id": "42"}))));
        assert!(!filter.matches(&GameSnapshot::new(json!({"id": 43}))));
        assert!(!filter.matches(&GameSnapshot::new(json!({"turn": 1}))));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ChannelStatus::Subscribed.to_string(), "SUBSCRIBED");
        assert_eq!(
            ChannelStatus::ChannelError("denied".into()).to_string(),
            "CHANNEL_ERROR: denied"
        );
    }
}
