// End-to-end flows through the public API, using the in-memory realtime
// service and store as explicit harness objects.

use gamesync::realtime::{ChannelStatus, MemoryRealtime, RealtimeService, SubscribeOutcome};
use gamesync::store::{MemoryStore, StateStore};
use gamesync::{
    ChannelListener, ConnectionManager, ConnectionState, GameSnapshot, ManagerConfig, SyncEvent,
    SyncListener,
};
use serde_json::json;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

fn config(game: &str) -> ManagerConfig {
    let mut config = ManagerConfig::new(game);
    config.auto_connect = false;
    config
}

fn store_with(game: &str, turn: i64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put(game, GameSnapshot::new(json!({"id": game, "turn": turn})));
    store
}

async fn next_state(events: &mut mpsc::UnboundedReceiver<SyncEvent>) -> ConnectionState {
    loop {
        if let SyncEvent::ConnectionChange(state) = events.recv().await.expect("event stream ended") {
            return state;
        }
    }
}

async fn next_turn(events: &mut mpsc::UnboundedReceiver<SyncEvent>) -> i64 {
    loop {
        if let SyncEvent::GameUpdate(snapshot) = events.recv().await.expect("event stream ended") {
            return snapshot.record()["turn"].as_i64().expect("turn is a number");
        }
    }
}

// ── Listener that presses "Retry" itself ─────────────────────────────────────

/// Calls `force_reconnect` the first time retries are reported exhausted,
/// from inside the notification callback.
struct RetryButton {
    manager: OnceLock<Weak<ConnectionManager>>,
    realtime: Arc<MemoryRealtime>,
    states: Mutex<Vec<ConnectionState>>,
    pressed: Mutex<bool>,
}

impl SyncListener for RetryButton {
    fn on_connection_change(&self, state: ConnectionState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_error(&self, message: &str) {
        if !message.contains("reconnect to try again") {
            return;
        }
        let mut pressed = self.pressed.lock().unwrap();
        if *pressed {
            return;
        }
        *pressed = true;

        self.realtime.set_default_outcome(SubscribeOutcome::Confirm);
        if let Some(manager) = self.manager.get().and_then(Weak::upgrade) {
            manager.force_reconnect();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_listener_can_reconnect_from_callback() {
    let realtime = Arc::new(MemoryRealtime::with_default(SubscribeOutcome::Reject(
        "rls policy".into(),
    )));
    let listener = Arc::new(RetryButton {
        manager: OnceLock::new(),
        realtime: Arc::clone(&realtime),
        states: Mutex::new(Vec::new()),
        pressed: Mutex::new(false),
    });

    let manager = Arc::new(ConnectionManager::new(
        config("g1"),
        Arc::clone(&realtime) as Arc<dyn RealtimeService>,
        store_with("g1", 1) as Arc<dyn StateStore>,
        Arc::clone(&listener) as Arc<dyn SyncListener>,
    ));
    let _ = listener.manager.set(Arc::downgrade(&manager));

    manager.connect();

    // Two backoff delays (1s + 2s) and some slack
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(realtime.subscribe_calls(), 4);
    assert_eq!(realtime.active_subscriptions(), 1);

    use ConnectionState::*;
    assert_eq!(
        *listener.states.lock().unwrap(),
        vec![
            Connecting,
            Error,
            Reconnecting,
            Connecting,
            Error,
            Reconnecting,
            Connecting,
            Error,
            Connecting,
            Connected
        ]
    );
}

// ── Push and poll together ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_push_and_poll_both_forwarded_in_arrival_order() {
    let realtime = Arc::new(MemoryRealtime::with_default(SubscribeOutcome::Silent));
    let store = store_with("g1", 1);
    let (listener, mut events) = ChannelListener::new();

    let mut config = config("g1");
    config.subscribe_timeout = Duration::from_secs(60);
    let manager = ConnectionManager::new(
        config,
        Arc::clone(&realtime) as Arc<dyn RealtimeService>,
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::new(listener),
    );

    manager.connect();
    manager.start_polling();

    // Poll tick at 2s
    assert_eq!(next_turn(&mut events).await, 1);

    // A push before confirmation is still forwarded
    realtime.publish("game-g1", GameSnapshot::new(json!({"id": "g1", "turn": 2})));
    assert_eq!(next_turn(&mut events).await, 2);

    // The next poll carries an older turn; it is forwarded as-is
    assert_eq!(next_turn(&mut events).await, 1);

    // Confirmation silences the poller
    realtime.send_status("game-g1", ChannelStatus::Subscribed);
    while next_state(&mut events).await != ConnectionState::Connected {}
    assert!(!manager.is_polling());

    store.put("g1", GameSnapshot::new(json!({"id": "g1", "turn": 3})));
    realtime.publish("game-g1", GameSnapshot::new(json!({"id": "g1", "turn": 4})));
    assert_eq!(next_turn(&mut events).await, 4);
}

// ── Independent managers ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_managers_for_different_games_are_isolated() {
    let realtime = Arc::new(MemoryRealtime::new());
    let (listener_a, mut events_a) = ChannelListener::new();
    let (listener_b, mut events_b) = ChannelListener::new();

    let a = ConnectionManager::new(
        config("a"),
        Arc::clone(&realtime) as Arc<dyn RealtimeService>,
        store_with("a", 1) as Arc<dyn StateStore>,
        Arc::new(listener_a),
    );
    let b = ConnectionManager::new(
        config("b"),
        Arc::clone(&realtime) as Arc<dyn RealtimeService>,
        store_with("b", 1) as Arc<dyn StateStore>,
        Arc::new(listener_b),
    );

    a.connect();
    b.connect();
    while next_state(&mut events_a).await != ConnectionState::Connected {}
    while next_state(&mut events_b).await != ConnectionState::Connected {}
    assert_eq!(realtime.active_subscriptions(), 2);

    realtime.publish("game-a", GameSnapshot::new(json!({"id": "a", "turn": 10})));
    assert_eq!(next_turn(&mut events_a).await, 10);

    b.disconnect();
    assert_eq!(realtime.active_subscriptions(), 1);
    assert_eq!(a.state(), ConnectionState::Connected);
    assert_eq!(b.state(), ConnectionState::Disconnected);
}
