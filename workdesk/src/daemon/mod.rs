//! Daemon role: orchestrator, producers, and control API wired together.

mod events;
mod orchestrator;

pub use events::{Command, Event, Notification, RestoreReport, StateConflict};
pub use orchestrator::Orchestrator;

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, watch};

use crate::bridge::spawn_bridge;
use crate::capture::source_from_config;
use crate::config::Config;
use crate::db::Database;
use crate::desktop::{provider_from_config, spawn_watcher, DesktopTopology};
use crate::server;

/// Run the daemon until ctrl-c.
///
/// A store that cannot be opened is the one fatal startup condition;
/// every other producer degrades softly.
pub async fn run(config: Config) -> Result<()> {
    let db_path = match &config.daemon.db_path {
        Some(path) => path.clone(),
        None => Database::default_path()?,
    };
    let db = Database::open_at(&db_path).context("Persistence store unavailable")?;
    tracing::info!(path = %db_path.display(), "Store opened");

    let provider = provider_from_config(&config.watcher);
    let windows = source_from_config(&config.capture);

    let (events_tx, events_rx) = mpsc::channel::<Event>(256);
    let (notify_tx, _) = broadcast::channel::<Notification>(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (bridge, bridge_task) =
        spawn_bridge(&config.bridge, events_tx.clone(), shutdown_rx.clone());

    // One synchronous enumeration primes both reconciliation and the
    // watcher baseline, so adopted desktops do not re-fire as created.
    let baseline = provider.enumerate().unwrap_or_else(|e| {
        tracing::warn!("Initial desktop enumeration failed: {e:#}");
        DesktopTopology::default()
    });

    let mut orch = Orchestrator::new(
        db,
        windows,
        bridge,
        notify_tx.clone(),
        events_tx.clone(),
        config.restore.clone(),
        config.bridge.cdp_port,
    );
    orch.reconcile_startup(&baseline)?;

    let watcher_task = spawn_watcher(
        provider,
        &config.watcher,
        &baseline,
        events_tx.clone(),
        shutdown_rx.clone(),
    );

    let reader_db = Database::open_at(&db_path).context("Persistence store unavailable")?;
    let server_task = tokio::spawn(server::start_server(
        config.daemon.control_port,
        reader_db,
        events_tx.clone(),
        notify_tx.clone(),
        shutdown_rx.clone(),
    ));

    let snapshot_interval = Duration::from_secs(config.capture.snapshot_interval_secs.max(1));
    let orch_task = tokio::spawn(orch.run(events_rx, shutdown_rx, snapshot_interval));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    // Producers stop first; the orchestrator drains what they already
    // delivered, then ends sessions and releases the store.
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(watcher_task, bridge_task, orch_task);
    if let Ok(Err(e)) = server_task.await {
        tracing::warn!("Control API exited with error: {e:#}");
    }

    Ok(())
}
