// Timer-driven fallback for when push delivery is unavailable

use crate::error::SyncError;
use crate::listener::SyncEvent;
use crate::store::StateStore;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};


/// Default interval between poll ticks (2 seconds)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest poll interval; shorter values are raised to this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Periodically re-fetches the authoritative record of one game.
///
/// Every tick forwards either a `GameUpdate` or an `Error` notification.
/// Fetch failures never stop the timer; only `stop_polling` (or drop) does.
pub struct PollingFallback {
    game_id: String,
    store: Arc<dyn StateStore>,
    interval: Duration,
    notices: mpsc::UnboundedSender<SyncEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingFallback {
    pub fn new(
        game_id: String,
        store: Arc<dyn StateStore>,
        interval: Duration,
        notices: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        // tokio intervals panic on a zero period
        let interval = if interval < MIN_POLL_INTERVAL {
            warn!(
                game_id = %game_id,
                interval_ms = interval.as_millis() as u64,
                "Poll interval too short, using {}ms",
                MIN_POLL_INTERVAL.as_millis()
            );
            MIN_POLL_INTERVAL
        } else {
            interval
        };

        Self {
            game_id,
            store,
            interval,
            notices,
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the poll timer. The first tick fires one interval from now.
    ///
    /// Returns false if polling was already running.
    pub fn start_polling(&self) -> bool {
        let mut task = self.task();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        info!(
            game_id = %self.game_id,
            interval_ms = self.interval.as_millis() as u64,
            "Starting fallback polling"
        );

        let game_id = self.game_id.clone();
        let store = Arc::clone(&self.store);
        let notices = self.notices.clone();
        let period = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                let notice = match store.fetch_record(&game_id).await {
                    Ok(snapshot) => {
                        debug!(game_id = %game_id, "Poll tick fetched game state");
                        SyncEvent::GameUpdate(snapshot)
                    }
                    Err(e) => {
                        warn!(game_id = %game_id, error = %e, "Poll tick failed, will keep polling");
                        SyncEvent::Error(SyncError::FetchFailure(e).to_string())
                    }
                };

                if notices.send(notice).is_err() {
                    debug!(game_id = %game_id, "Notification channel closed, polling stopped");
                    return;
                }
            }
        }));

        true
    }

    /// Cancel the poll timer.
    ///
    /// Returns false if polling was not running.
    pub fn stop_polling(&self) -> bool {
        match self.task().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                if was_running {
                    info!(game_id = %self.game_id, "Stopped fallback polling");
                }
                was_running
            }
            None => false,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.task().as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        if let Some(handle) = self.task().take() {
            handle.abort();
        }
    }
}
