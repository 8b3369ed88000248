//! Realtime game-state synchronization.
//!
//! A [`ConnectionManager`] keeps one realtime subscription to a game's change
//! feed alive, retries with capped exponential backoff, and can fall back to
//! polling the authoritative store. Everything it learns reaches the caller
//! through a [`SyncListener`].
//!
//! ```text
//!   RealtimeService ──push──┐
//!                           ├──▶ ConnectionManager ──▶ SyncListener
//!   StateStore ──poll───────┘
//! ```

// Opaque game rows
pub mod record;

// Error taxonomy
pub mod error;

// Caller-facing notifications
pub mod listener;

// Connection state machine and retry logic
pub mod connection;

// Polling fallback
pub mod polling;

// Realtime subscription backends
pub mod realtime;

// Authoritative state store backends
pub mod store;

// TOML + env configuration
pub mod config;

pub use connection::{ConnectionManager, ConnectionState, ManagerConfig, SyncStatus};
pub use error::{FetchError, SyncError};
pub use listener::{ChannelListener, SyncEvent, SyncListener};
pub use record::GameSnapshot;
