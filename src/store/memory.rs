use super::StateStore;
use crate::error::FetchError;
use crate::record::GameSnapshot;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-memory state store.
///
/// Holds one canonical record per game. `set_offline(true)` makes every
/// fetch fail with a network error until switched back.
pub struct MemoryStore {
    records: DashMap<String, GameSnapshot>,
    offline: AtomicBool,
    fetches: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            offline: AtomicBool::new(false),
            fetches: AtomicU64::new(0),
        }
    }

    /// Insert or replace the record for `game_id`
    pub fn put(&self, game_id: &str, snapshot: GameSnapshot) {
        self.records.insert(game_id.to_string(), snapshot);
    }

    /// Remove the record for `game_id`
    pub fn remove(&self, game_id: &str) -> Option<GameSnapshot> {
        self.records.remove(game_id).map(|(_, s)| s)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Total fetch calls, successful or not
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn fetch_record(&self, game_id: &str) -> Result<GameSnapshot, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network("store is offline".to_string()));
        }

        self.records
            .get(game_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| FetchError::NotFound(game_id.to_string()))
    }
}
