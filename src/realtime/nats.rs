use super::{ChannelEvent, ChannelFilter, ChannelStatus, RealtimeService, Subscription, SubscriptionId};
use crate::record::GameSnapshot;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// NATS realtime configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsRealtimeConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

fn default_subject_prefix() -> String {
    "gamesync".to_string()
}

impl Default for NatsRealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

/// Subject carrying the change feed of `channel`
///
/// Format: {prefix}.{channel}
pub fn channel_subject(prefix: &str, channel: &str) -> String {
    format!("{}.{}", prefix, channel)
}

/// Realtime service backed by core NATS subjects.
///
/// Each subscription gets a forwarding task that turns NATS messages into
/// `ChannelEvent`s. Releasing a subscription aborts its task, which drops
/// the NATS subscriber and unsubscribes on the server.
pub struct NatsRealtime {
    client: async_nats::Client,
    subject_prefix: String,
    next_id: AtomicU64,
    forwarders: DashMap<SubscriptionId, JoinHandle<()>>,
}

impl NatsRealtime {
    /// Connect to NATS
    pub async fn connect(config: &NatsRealtimeConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        Ok(Self::new(client, config.subject_prefix.clone()))
    }

    /// Wrap an existing client
    pub fn new(client: async_nats::Client, subject_prefix: String) -> Self {
        Self {
            client,
            subject_prefix,
            next_id: AtomicU64::new(1),
            forwarders: DashMap::new(),
        }
    }

    /// Number of forwarding tasks not yet released
    pub fn active_subscriptions(&self) -> usize {
        self.forwarders.len()
    }
}

#[async_trait]
impl RealtimeService for NatsRealtime {
    async fn subscribe(&self, channel: &str, filter: &ChannelFilter) -> Result<Subscription> {
        let subject = channel_subject(&self.subject_prefix, channel);

        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context(format!("Failed to subscribe to subject '{}'", subject))?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let filter = filter.clone();

        debug!(subject = %subject, subscription = %id, filter = %filter.expression(), "Opened NATS subscription");

        let handle = tokio::spawn(async move {
            // The server has registered the interest once a flush round-trips
            if let Err(e) = client.flush().await {
                let _ = tx.send(ChannelEvent::Status(ChannelStatus::ChannelError(e.to_string())));
                return;
            }
            if tx.send(ChannelEvent::Status(ChannelStatus::Subscribed)).is_err() {
                return;
            }

            while let Some(message) = subscriber.next().await {
                let record: Value = match serde_json::from_slice(&message.payload) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(subject = %message.subject, error = %e, "Skipping non-JSON change message");
                        continue;
                    }
                };

                let snapshot = GameSnapshot::new(record);
                if !filter.matches(&snapshot) {
                    debug!(subject = %message.subject, "Change does not match filter, skipped");
                    continue;
                }

                if tx.send(ChannelEvent::Change(snapshot)).is_err() {
                    return;
                }
            }

            let _ = tx.send(ChannelEvent::Status(ChannelStatus::Closed));
        });

        self.forwarders.insert(id, handle);

        Ok(Subscription { id, events: rx })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some((_, handle)) = self.forwarders.remove(&id) {
            handle.abort();
            debug!(subscription = %id, "Released NATS subscription");
        }
    }
}

impl Drop for NatsRealtime {
    fn drop(&mut self) {
        for entry in self.forwarders.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_subject() {
        assert_eq!(channel_subject("gamesync", "game-abc"), "gamesync.game-abc");
    }

    #[test]
    fn test_config_defaults_from_toml() {
        let config: NatsRealtimeConfig = toml::from_str(r#"url = "nats://example.com:4222""#).unwrap();
        assert_eq!(config.url, "nats://example.com:4222");
        assert_eq!(config.subject_prefix, "gamesync");
    }
}
