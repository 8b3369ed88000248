//! Caller-facing notifications.
//!
//! The manager never calls a listener directly. Notifications go through an
//! unbounded channel to a single dispatcher task, so they arrive in the order
//! they were produced and a listener is free to call back into the manager.

use crate::connection::ConnectionState;
use crate::record::GameSnapshot;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Receives game updates, state transitions and error descriptions.
pub trait SyncListener: Send + Sync + 'static {
    fn on_game_update(&self, _snapshot: &GameSnapshot) {}

    fn on_connection_change(&self, _state: ConnectionState) {}

    fn on_error(&self, _message: &str) {}
}

/// One notification
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    GameUpdate(GameSnapshot),
    ConnectionChange(ConnectionState),
    Error(String),
}

/// Listener that forwards every notification into a channel
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SyncListener for ChannelListener {
    fn on_game_update(&self, snapshot: &GameSnapshot) {
        let _ = self.tx.send(SyncEvent::GameUpdate(snapshot.clone()));
    }

    fn on_connection_change(&self, state: ConnectionState) {
        let _ = self.tx.send(SyncEvent::ConnectionChange(state));
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(SyncEvent::Error(message.to_string()));
    }
}

/// What the dispatcher has forwarded so far
#[derive(Debug, Clone, Default)]
pub struct Activity {
    pub update_count: u64,
    pub last_update_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub(crate) type SharedActivity = Arc<Mutex<Activity>>;

/// Spawn the dispatcher task feeding `listener`.
///
/// The task ends once every sender is dropped.
pub(crate) fn spawn_dispatcher(
    listener: Arc<dyn SyncListener>,
    activity: SharedActivity,
) -> (mpsc::UnboundedSender<SyncEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<SyncEvent>();

    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            record_activity(&activity, &event);

            match &event {
                SyncEvent::GameUpdate(snapshot) => listener.on_game_update(snapshot),
                SyncEvent::ConnectionChange(state) => listener.on_connection_change(*state),
                SyncEvent::Error(message) => listener.on_error(message),
            }
        }
        debug!("Notification dispatcher stopped");
    });

    (tx, handle)
}

fn record_activity(activity: &SharedActivity, event: &SyncEvent) {
    let mut activity = activity.lock().unwrap_or_else(PoisonError::into_inner);
    match event {
        SyncEvent::GameUpdate(_) => {
            activity.update_count += 1;
            activity.last_update_at = Some(Utc::now());
        }
        SyncEvent::Error(message) => activity.last_error = Some(message.clone()),
        SyncEvent::ConnectionChange(ConnectionState::Connected) => activity.last_error = None,
        SyncEvent::ConnectionChange(_) => {}
    }
}
