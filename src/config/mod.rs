use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::connection::{BackoffPolicy, ManagerConfig};

// Re-export collaborator config types
pub use crate::realtime::NatsRealtimeConfig;
pub use crate::store::HttpStoreConfig;

/// Complete gamesync configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GameSyncConfig {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub nats: NatsRealtimeConfig,
    #[serde(default)]
    pub store: HttpStoreConfig,
}

/// Which game to follow and how persistently
#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    #[serde(default)]
    pub identifier: String,
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fall back to polling once reconnects are exhausted
    #[serde(default = "default_poll_on_exhausted")]
    pub poll_on_exhausted: bool,
}

fn default_auto_connect() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_on_exhausted() -> bool {
    true
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            auto_connect: default_auto_connect(),
            max_retries: default_max_retries(),
            poll_on_exhausted: default_poll_on_exhausted(),
        }
    }
}

/// Timer settings (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_timeout_ms: u64,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_subscribe_timeout() -> u64 {
    10_000
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_max() -> u64 {
    10_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            subscribe_timeout_ms: default_subscribe_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

impl GameSyncConfig {
    /// Apply `GAMESYNC_*` environment variables on top of the loaded values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GAMESYNC_GAME_ID") {
            self.game.identifier = v;
        }
        if let Some(v) = lookup("GAMESYNC_MAX_RETRIES") {
            if let Ok(n) = v.parse::<u32>() {
                self.game.max_retries = n;
            }
        }
        if let Some(v) = lookup("GAMESYNC_AUTO_CONNECT") {
            if let Ok(b) = v.parse::<bool>() {
                self.game.auto_connect = b;
            }
        }
        if let Some(v) = lookup("GAMESYNC_STORE_URL") {
            self.store.base_url = v;
        }
        if let Some(v) = lookup("GAMESYNC_STORE_KEY") {
            self.store.api_key = Some(v);
        }
        if let Some(v) = lookup("NATS_URL") {
            self.nats.url = v;
        }
    }

    /// Reject timer settings the runtime cannot honor
    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        if timing.poll_interval_ms == 0 {
            anyhow::bail!("[timing].poll_interval_ms must be greater than zero");
        }
        if timing.subscribe_timeout_ms == 0 {
            anyhow::bail!("[timing].subscribe_timeout_ms must be greater than zero");
        }
        if timing.backoff_base_ms == 0 {
            anyhow::bail!("[timing].backoff_base_ms must be greater than zero");
        }
        if timing.backoff_max_ms < timing.backoff_base_ms {
            anyhow::bail!(
                "[timing].backoff_max_ms ({}) is below backoff_base_ms ({})",
                timing.backoff_max_ms,
                timing.backoff_base_ms
            );
        }
        Ok(())
    }

    /// Manager construction parameters derived from this config
    pub fn manager_config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::new(self.game.identifier.clone());
        config.auto_connect = self.game.auto_connect;
        config.max_retries = self.game.max_retries;
        config.table = self.store.table.clone();
        config.id_column = self.store.id_column.clone();
        config.backoff = BackoffPolicy::new(
            Duration::from_millis(self.timing.backoff_base_ms),
            Duration::from_millis(self.timing.backoff_max_ms),
        );
        config.poll_interval = Duration::from_millis(self.timing.poll_interval_ms);
        config.subscribe_timeout = Duration::from_millis(self.timing.subscribe_timeout_ms);
        config
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<GameSyncConfig> {
    let contents = std::fs::read_to_string(path)
        .context(format!("Failed to read config file '{}'", path))?;
    let config: GameSyncConfig = toml::from_str(&contents)
        .context(format!("Failed to parse config file '{}'", path))?;
    config
        .validate()
        .context(format!("Invalid config file '{}'", path))?;
    Ok(config)
}
