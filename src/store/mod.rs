// Authoritative state store seam

mod http;
mod memory;

pub use http::{HttpStateStore, HttpStoreConfig};
pub use memory::MemoryStore;

use crate::error::FetchError;
use crate::record::GameSnapshot;
use async_trait::async_trait;

/// Source of the authoritative game row
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the current record for `game_id`
    async fn fetch_record(&self, game_id: &str) -> Result<GameSnapshot, FetchError>;
}
