use crate::connection::{BackoffPolicy, ConnectionState};
use crate::error::SyncError;
use crate::listener::{spawn_dispatcher, SharedActivity, SyncEvent, SyncListener};
use crate::polling::{PollingFallback, DEFAULT_POLL_INTERVAL};
use crate::realtime::{ChannelEvent, ChannelFilter, ChannelStatus, RealtimeService, SubscriptionId};
use crate::store::StateStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};


/// Default retry budget per connect cycle
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait for a subscription to be confirmed (10 seconds)
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Construction parameters for a `ConnectionManager`
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Game whose row is tracked
    pub game_identifier: String,
    /// Connect as soon as the manager is built
    pub auto_connect: bool,
    /// Connection attempts allowed before giving up, counting the first
    pub max_retries: u32,
    /// Table holding the game rows
    pub table: String,
    /// Column the channel filter matches against
    pub id_column: String,
    pub backoff: BackoffPolicy,
    pub poll_interval: Duration,
    pub subscribe_timeout: Duration,
}

impl ManagerConfig {
    pub fn new(game_identifier: impl Into<String>) -> Self {
        Self {
            game_identifier: game_identifier.into(),
            auto_connect: true,
            max_retries: DEFAULT_MAX_RETRIES,
            table: "games".to_string(),
            id_column: "id".to_string(),
            backoff: BackoffPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
        }
    }

    /// Realtime channel name for this game
    pub fn channel_name(&self) -> String {
        format!("game-{}", self.game_identifier)
    }

    pub fn channel_filter(&self) -> ChannelFilter {
        ChannelFilter::new(&self.table, &self.id_column, &self.game_identifier)
    }
}

/// Point-in-time view of a manager
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub state: ConnectionState,
    pub retry_count: u32,
    pub retries_exhausted: bool,
    pub polling: bool,
    pub update_count: u64,
    pub last_update_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Keeps one realtime subscription per game alive.
///
/// Every operation returns immediately; subscription attempts, retry timers
/// and poll ticks run as tokio tasks. Failures never surface as `Err`: they
/// show up as state transitions and `on_error` notifications.
///
/// Must be created inside a tokio runtime. Dropping the manager has the
/// same effect as `disconnect`.
pub struct ConnectionManager {
    core: Arc<Core>,
}

struct Core {
    game_id: String,
    channel: String,
    filter: ChannelFilter,
    max_retries: u32,
    backoff: BackoffPolicy,
    subscribe_timeout: Duration,
    realtime: Arc<dyn RealtimeService>,
    poller: PollingFallback,
    notices: mpsc::UnboundedSender<SyncEvent>,
    activity: SharedActivity,
    inner: Mutex<Inner>,
}

struct Inner {
    state: ConnectionState,
    retry_count: u32,
    exhausted: bool,
    /// Bumped for every attempt and on disconnect; stale tasks compare
    /// against it and bow out
    generation: u64,
    subscription: Option<SubscriptionId>,
    attempt_task: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
}

/// What the attempt task should do after an event was handled
enum EventOutcome {
    Continue,
    Confirmed,
    Stop,
}

impl ConnectionManager {
    /// Create a manager. Connects right away when `config.auto_connect`.
    pub fn new(
        config: ManagerConfig,
        realtime: Arc<dyn RealtimeService>,
        store: Arc<dyn StateStore>,
        listener: Arc<dyn SyncListener>,
    ) -> Self {
        let activity = SharedActivity::default();
        let (notices, _dispatcher) = spawn_dispatcher(listener, Arc::clone(&activity));

        let poller = PollingFallback::new(
            config.game_identifier.clone(),
            store,
            config.poll_interval,
            notices.clone(),
        );

        let core = Arc::new(Core {
            game_id: config.game_identifier.clone(),
            channel: config.channel_name(),
            filter: config.channel_filter(),
            max_retries: config.max_retries,
            backoff: config.backoff,
            subscribe_timeout: config.subscribe_timeout,
            realtime,
            poller,
            notices,
            activity,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                retry_count: 0,
                exhausted: false,
                generation: 0,
                subscription: None,
                attempt_task: None,
                retry_timer: None,
            }),
        });

        info!(game_id = %core.game_id, channel = %core.channel, "Connection manager created");

        let manager = Self { core };
        if config.auto_connect {
            manager.connect();
        }
        manager
    }

    /// Open the subscription. No-op while connecting or connected.
    pub fn connect(&self) {
        self.core.connect();
    }

    /// Release the subscription, cancel every timer, go `Disconnected`.
    pub fn disconnect(&self) {
        self.core.disconnect();
    }

    /// Schedule the next attempt with backoff, or give up for good once
    /// the retry budget is spent.
    pub fn retry(&self) {
        let mut inner = self.core.lock();
        self.core.retry_locked(&mut inner);
    }

    /// Start over with a fresh retry budget, whatever the current state.
    pub fn force_reconnect(&self) {
        self.core.force_reconnect();
    }

    /// Start the fallback poller
    pub fn start_polling(&self) {
        self.core.poller.start_polling();
    }

    /// Stop the fallback poller
    pub fn stop_polling(&self) {
        self.core.poller.stop_polling();
    }

    pub fn is_polling(&self) -> bool {
        self.core.poller.is_polling()
    }

    pub fn state(&self) -> ConnectionState {
        self.core.lock().state
    }

    pub fn retry_count(&self) -> u32 {
        self.core.lock().retry_count
    }

    /// True once the retry budget is spent and no retry is pending
    pub fn retries_exhausted(&self) -> bool {
        self.core.lock().exhausted
    }

    /// Whether a backoff timer is waiting to fire
    pub fn has_pending_retry(&self) -> bool {
        self.core
            .lock()
            .retry_timer
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Whether a subscription handle is currently held
    pub fn has_subscription(&self) -> bool {
        self.core.lock().subscription.is_some()
    }

    pub fn game_identifier(&self) -> &str {
        &self.core.game_id
    }

    pub fn status(&self) -> SyncStatus {
        let (state, retry_count, retries_exhausted) = {
            let inner = self.core.lock();
            (inner.state, inner.retry_count, inner.exhausted)
        };
        let activity = self
            .core
            .activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        SyncStatus {
            state,
            retry_count,
            retries_exhausted,
            polling: self.core.poller.is_polling(),
            update_count: activity.update_count,
            last_update_at: activity.last_update_at,
            last_error: activity.last_error,
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.core.disconnect();
    }
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: SyncEvent) {
        let _ = self.notices.send(event);
    }

    /// The only place `state` changes. Notifies on actual changes.
    fn transition(&self, inner: &mut Inner, next: ConnectionState) {
        if inner.state == next {
            return;
        }
        debug!(game_id = %self.game_id, from = %inner.state, to = %next, "Connection state change");
        inner.state = next;
        self.notify(SyncEvent::ConnectionChange(next));
    }

    fn connect(self: &Arc<Self>) {
        let mut inner = self.lock();
        if inner.state.is_active() {
            debug!(game_id = %self.game_id, state = %inner.state, "Already connecting or connected");
            return;
        }

        cancel_retry_timer(&mut inner);
        inner.retry_count = 0;
        inner.exhausted = false;
        self.begin_attempt(&mut inner);
    }

    fn force_reconnect(self: &Arc<Self>) {
        let mut inner = self.lock();
        info!(game_id = %self.game_id, state = %inner.state, "Forcing reconnect");

        cancel_retry_timer(&mut inner);
        inner.retry_count = 0;
        inner.exhausted = false;
        self.begin_attempt(&mut inner);
    }

    fn disconnect(&self) {
        let mut inner = self.lock();
        inner.generation += 1;

        cancel_retry_timer(&mut inner);
        self.release_subscription(&mut inner);
        self.poller.stop_polling();

        if inner.state != ConnectionState::Disconnected {
            info!(game_id = %self.game_id, "Disconnected from realtime channel");
        }
        self.transition(&mut inner, ConnectionState::Disconnected);
    }

    /// Abort the in-flight attempt and unsubscribe its handle
    fn release_subscription(&self, inner: &mut Inner) {
        if let Some(task) = inner.attempt_task.take() {
            task.abort();
        }
        if let Some(id) = inner.subscription.take() {
            debug!(game_id = %self.game_id, subscription = %id, "Releasing subscription");
            self.realtime.unsubscribe(id);
        }
    }

    fn begin_attempt(self: &Arc<Self>, inner: &mut Inner) {
        self.release_subscription(inner);

        inner.generation += 1;
        let generation = inner.generation;
        self.transition(inner, ConnectionState::Connecting);

        info!(
            game_id = %self.game_id,
            channel = %self.channel,
            attempt = inner.retry_count + 1,
            "Connecting to realtime channel"
        );

        inner.attempt_task = Some(tokio::spawn(run_attempt(
            Arc::downgrade(self),
            Arc::clone(&self.realtime),
            self.channel.clone(),
            self.filter.clone(),
            generation,
            self.subscribe_timeout,
        )));
    }

    /// Record the handle of a freshly opened subscription.
    ///
    /// Returns false if the attempt was superseded meanwhile; the caller
    /// then owns the handle and must release it.
    fn register(&self, generation: u64, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        debug!(game_id = %self.game_id, subscription = %id, "Subscription opened");
        inner.subscription = Some(id);
        true
    }

    fn handle_event(self: &Arc<Self>, generation: u64, event: ChannelEvent) -> EventOutcome {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(game_id = %self.game_id, "Ignoring event from superseded subscription");
            return EventOutcome::Stop;
        }

        match event {
            ChannelEvent::Change(snapshot) => {
                self.notify(SyncEvent::GameUpdate(snapshot));
                EventOutcome::Continue
            }
            ChannelEvent::Status(ChannelStatus::Subscribed) => {
                inner.retry_count = 0;
                inner.exhausted = false;
                self.transition(&mut inner, ConnectionState::Connected);

                if self.poller.stop_polling() {
                    info!(game_id = %self.game_id, "Realtime confirmed, fallback polling stopped");
                }
                info!(game_id = %self.game_id, channel = %self.channel, "Realtime subscription confirmed");
                EventOutcome::Confirmed
            }
            ChannelEvent::Status(status) => {
                self.fail_locked(&mut inner, status.to_string());
                EventOutcome::Stop
            }
        }
    }

    fn fail(self: &Arc<Self>, generation: u64, reason: String) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        self.fail_locked(&mut inner, reason);
    }

    /// Runs on the attempt task itself, so its handle is detached rather
    /// than aborted.
    fn fail_locked(self: &Arc<Self>, inner: &mut Inner, reason: String) {
        warn!(
            game_id = %self.game_id,
            state = %inner.state,
            reason = %reason,
            "Realtime subscription failed"
        );

        inner.attempt_task.take();
        if let Some(id) = inner.subscription.take() {
            self.realtime.unsubscribe(id);
        }

        self.transition(inner, ConnectionState::Error);
        self.notify(SyncEvent::Error(SyncError::SubscriptionFailure(reason).to_string()));
        self.retry_locked(inner);
    }

    fn retry_locked(self: &Arc<Self>, inner: &mut Inner) {
        if inner.state.is_active() || inner.state == ConnectionState::Reconnecting {
            debug!(game_id = %self.game_id, state = %inner.state, "Nothing to retry");
            return;
        }

        let attempts = inner.retry_count + 1;
        if attempts >= self.max_retries.max(1) {
            cancel_retry_timer(inner);
            if !inner.exhausted {
                error!(
                    game_id = %self.game_id,
                    attempts = attempts,
                    "Retries exhausted, waiting for explicit reconnect"
                );
                inner.exhausted = true;
                self.notify(SyncEvent::Error(SyncError::RetriesExhausted { attempts }.to_string()));
            }
            self.transition(inner, ConnectionState::Error);
            return;
        }

        let delay = self.backoff.delay(inner.retry_count);
        inner.retry_count += 1;
        self.transition(inner, ConnectionState::Reconnecting);

        info!(
            game_id = %self.game_id,
            retry = inner.retry_count,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        cancel_retry_timer(inner);
        let generation = inner.generation;
        let manager = Arc::downgrade(self);
        inner.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(core) = manager.upgrade() {
                core.fire_retry(generation);
            }
        }));
    }

    fn fire_retry(self: &Arc<Self>, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation || inner.state != ConnectionState::Reconnecting {
            return;
        }
        // This is the timer's own task; let it finish
        inner.retry_timer.take();
        self.begin_attempt(&mut inner);
    }
}

fn cancel_retry_timer(inner: &mut Inner) {
    if let Some(timer) = inner.retry_timer.take() {
        timer.abort();
    }
}

/// One subscription attempt, from `subscribe` until the channel fails or
/// the attempt is superseded.
async fn run_attempt(
    manager: Weak<Core>,
    realtime: Arc<dyn RealtimeService>,
    channel: String,
    filter: ChannelFilter,
    generation: u64,
    subscribe_timeout: Duration,
) {
    let deadline = Instant::now() + subscribe_timeout;

    let mut subscription = match timeout_at(deadline, realtime.subscribe(&channel, &filter)).await {
        Ok(Ok(subscription)) => subscription,
        Ok(Err(e)) => {
            if let Some(core) = manager.upgrade() {
                core.fail(generation, format!("{:#}", e));
            }
            return;
        }
        Err(_) => {
            if let Some(core) = manager.upgrade() {
                core.fail(generation, ChannelStatus::TimedOut.to_string());
            }
            return;
        }
    };

    let registered = match manager.upgrade() {
        Some(core) => core.register(generation, subscription.id),
        None => false,
    };
    if !registered {
        realtime.unsubscribe(subscription.id);
        return;
    }

    let mut confirmed = false;
    loop {
        let next = if confirmed {
            subscription.events.recv().await
        } else {
            match timeout_at(deadline, subscription.events.recv()).await {
                Ok(event) => event,
                Err(_) => Some(ChannelEvent::Status(ChannelStatus::TimedOut)),
            }
        };

        // A closed stream is a closed channel
        let event = next.unwrap_or(ChannelEvent::Status(ChannelStatus::Closed));

        let Some(core) = manager.upgrade() else {
            return;
        };
        match core.handle_event(generation, event) {
            EventOutcome::Continue => {}
            EventOutcome::Confirmed => confirmed = true,
            EventOutcome::Stop => return,
        }
    }
}
