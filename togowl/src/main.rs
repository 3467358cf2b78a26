//! Togowl host - Main entry point
//!
//! Runs as the native messaging host of the timer overlay content script.
//! stdin/stdout carry the native messaging protocol, so logs go to stderr.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use togowl::clients::{SlackWebhook, TodoistClient, TogglClient};
use togowl::native;
use togowl::{Config, Dispatcher, Host, JsonFileStore, NativeSurface, Relay, Settings};

/// How long pending notifications may take to go out on exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    info!("Starting togowl host");
    info!("Configuration loaded from {:?}", Config::default_config_path());

    if !config.general.enabled {
        info!("Overlay is disabled in configuration, exiting");
        return Ok(());
    }

    let store = JsonFileStore::new(config.storage.settings_path());
    info!("Settings stored in {:?}", store.path());
    let settings = Settings::new(Arc::new(store));

    let messenger = Arc::new(SlackWebhook::new(config.services.request_timeout())?);
    let tasks = Arc::new(TodoistClient::new(&config.services)?);
    let timers = Arc::new(TogglClient::new(&config.services)?);

    let (surface, commands) = NativeSurface::new();
    let surface = Arc::new(surface);
    let dispatcher = Dispatcher::new(
        surface.clone(),
        settings.clone(),
        messenger,
        config.dispatcher.clone(),
    );
    let relay = Relay::new(dispatcher.clone(), settings, tasks, timers, &config);

    // Native messaging is blocking I/O, keep it off the runtime
    let (message_tx, message_rx) = mpsc::channel(100);
    std::thread::spawn(move || native::run_reader_loop(io::stdin(), message_tx));
    std::thread::spawn(move || native::run_writer_loop(io::stdout(), commands));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })?;

    let mut host = Host::new(surface, relay);
    let status = host.run(message_rx, shutdown_rx).await;
    info!(
        "Handled {} message(s), attached: {}",
        status.messages_handled, status.attached
    );

    if tokio::time::timeout(SHUTDOWN_GRACE, dispatcher.wait_idle())
        .await
        .is_err()
    {
        warn!(
            "Exiting with {} undelivered notification(s)",
            dispatcher.pending()
        );
    }

    let stats = dispatcher.stats();
    info!(
        "Notifications delivered: {}, dropped: {}",
        stats.delivered, stats.dropped
    );
    Ok(())
}
