//! In-process realtime service.
//!
//! Scriptable stand-in for a hosted realtime backend. Tests construct one
//! explicitly, decide how each `subscribe` call resolves, and push status or
//! change events into the live subscriptions.

use super::{ChannelEvent, ChannelFilter, ChannelStatus, RealtimeService, Subscription, SubscriptionId};
use crate::record::GameSnapshot;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// How a `subscribe` call resolves
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeOutcome {
    /// Emit `Subscribed` right away
    Confirm,
    /// Emit `ChannelError` with the given reason
    Reject(String),
    /// Emit `TimedOut`
    TimeOut,
    /// Emit nothing; the subscriber waits for confirmation
    Silent,
    /// Return an error from `subscribe` itself
    Fail(String),
}

struct LiveSubscription {
    channel: String,
    filter: ChannelFilter,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

struct Inner {
    next_id: u64,
    default_outcome: SubscribeOutcome,
    scripted: VecDeque<SubscribeOutcome>,
    live: HashMap<SubscriptionId, LiveSubscription>,
    subscribe_calls: usize,
}

pub struct MemoryRealtime {
    inner: Mutex<Inner>,
}

impl MemoryRealtime {
    /// Service that confirms every subscription
    pub fn new() -> Self {
        Self::with_default(SubscribeOutcome::Confirm)
    }

    /// Service whose unscripted subscriptions resolve with `outcome`
    pub fn with_default(outcome: SubscribeOutcome) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                default_outcome: outcome,
                scripted: VecDeque::new(),
                live: HashMap::new(),
                subscribe_calls: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the outcome used once the script runs out
    pub fn set_default_outcome(&self, outcome: SubscribeOutcome) {
        self.lock().default_outcome = outcome;
    }

    /// Queue outcomes for the next subscribe calls, in order
    pub fn script(&self, outcomes: impl IntoIterator<Item = SubscribeOutcome>) {
        self.lock().scripted.extend(outcomes);
    }

    /// Number of subscriptions not yet released
    pub fn active_subscriptions(&self) -> usize {
        self.lock().live.len()
    }

    /// Total subscribe calls, including failed ones
    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }

    /// Deliver a change to every live subscription on `channel` whose
    /// filter accepts it. Returns the number of deliveries.
    pub fn publish(&self, channel: &str, snapshot: GameSnapshot) -> usize {
        let inner = self.lock();
        inner
            .live
            .values()
            .filter(|s| s.channel == channel && s.filter.matches(&snapshot))
            .filter(|s| s.tx.send(ChannelEvent::Change(snapshot.clone())).is_ok())
            .count()
    }

    /// Push a status event to every live subscription on `channel`
    pub fn send_status(&self, channel: &str, status: ChannelStatus) -> usize {
        let inner = self.lock();
        inner
            .live
            .values()
            .filter(|s| s.channel == channel)
            .filter(|s| s.tx.send(ChannelEvent::Status(status.clone())).is_ok())
            .count()
    }

    /// End the event streams of every subscription on `channel` without
    /// a status, as a dropped socket would. Handles stay registered until
    /// the subscriber releases them.
    pub fn drop_streams(&self, channel: &str) {
        let mut inner = self.lock();
        for sub in inner.live.values_mut().filter(|s| s.channel == channel) {
            let (closed_tx, _) = mpsc::unbounded_channel();
            sub.tx = closed_tx;
        }
    }
}

impl Default for MemoryRealtime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeService for MemoryRealtime {
    async fn subscribe(&self, channel: &str, filter: &ChannelFilter) -> Result<Subscription> {
        let mut inner = self.lock();
        inner.subscribe_calls += 1;

        let outcome = inner
            .scripted
            .pop_front()
            .unwrap_or_else(|| inner.default_outcome.clone());

        if let SubscribeOutcome::Fail(reason) = outcome {
            anyhow::bail!("subscribe to '{}' failed: {}", channel, reason);
        }

        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let first = match outcome {
            SubscribeOutcome::Confirm => Some(ChannelStatus::Subscribed),
            SubscribeOutcome::Reject(reason) => Some(ChannelStatus::ChannelError(reason)),
            SubscribeOutcome::TimeOut => Some(ChannelStatus::TimedOut),
            SubscribeOutcome::Silent | SubscribeOutcome::Fail(_) => None,
        };
        if let Some(status) = first {
            let _ = tx.send(ChannelEvent::Status(status));
        }

        debug!(channel = %channel, subscription = %id, "Memory subscription opened");

        inner.live.insert(
            id,
            LiveSubscription {
                channel: channel.to_string(),
                filter: filter.clone(),
                tx,
            },
        );

        Ok(Subscription { id, events: rx })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.lock().live.remove(&id).is_some() {
            debug!(subscription = %id, "Memory subscription released");
        }
    }
}
