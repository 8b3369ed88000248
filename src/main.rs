use anyhow::{Context, Result};
use gamesync::config::{load_config, GameSyncConfig};
use gamesync::realtime::NatsRealtime;
use gamesync::store::HttpStateStore;
use gamesync::{ChannelListener, ConnectionManager, ConnectionState, SyncEvent};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamesync=info".into()),
        )
        .init();

    info!("gamesync starting...");

    let mut config = match std::env::var("GAMESYNC_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => GameSyncConfig::default(),
    };
    config.apply_env_overrides();

    if config.game.identifier.is_empty() {
        anyhow::bail!("No game identifier configured (set [game].identifier or GAMESYNC_GAME_ID)");
    }
    config.validate()?;

    info!(
        game_id = %config.game.identifier,
        nats_url = %config.nats.url,
        store_url = %config.store.base_url,
        max_retries = config.game.max_retries,
        "Configuration loaded"
    );

    let realtime = Arc::new(
        NatsRealtime::connect(&config.nats)
            .await
            .context("Failed to initialize realtime service")?,
    );
    let store = Arc::new(HttpStateStore::new(config.store.clone()));
    let (listener, mut events) = ChannelListener::new();

    let manager = ConnectionManager::new(
        config.manager_config(),
        realtime,
        store,
        Arc::new(listener),
    );
    if !config.game.auto_connect {
        manager.connect();
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SyncEvent::GameUpdate(snapshot) => {
                        println!("{}", snapshot.into_record());
                    }
                    SyncEvent::ConnectionChange(state) => {
                        info!(state = %state, "Connection state changed");
                        if state == ConnectionState::Error
                            && manager.retries_exhausted()
                            && config.game.poll_on_exhausted
                            && !manager.is_polling()
                        {
                            warn!("Realtime unavailable, falling back to polling");
                            manager.start_polling();
                        }
                    }
                    SyncEvent::Error(message) => {
                        error!(error = %message, "Sync error");
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for ctrl_c signal")?;
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.disconnect();
    info!(
        game_id = %manager.game_identifier(),
        status = ?manager.status(),
        "gamesync stopped"
    );

    Ok(())
}
