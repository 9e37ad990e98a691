use std::path::Path;

use tokio::signal;
use tracing::{Instrument as _, error, info};

use super::{
    config_watcher::watch_config_file,
    state::{self, AppState},
};

/// Creates a future that resolves when a shutdown signal is received.
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    res = signal::ctrl_c() => drop(res),
                }
            }
            Err(e) => {
                error!("Failed to create SIGTERM signal handler: {e}");
                drop(signal::ctrl_c().await);
            }
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}

/// Start the config watcher. Each host follows the published config on its own.
fn start_config_watcher(app_state: &AppState) {
    let path = app_state.config_path.clone();
    let config_tx = app_state.config_tx.clone();
    tokio::spawn(
        async move {
            if let Err(e) = watch_config_file(path, config_tx).await {
                error!("Config watcher stopped: {e:?}");
            }
        }
        .in_current_span(),
    );
}

/// Run the monitor until a shutdown signal arrives.
///
/// Hosts start polling as soon as their own engine answers. Hosts still waiting for their engine
/// at shutdown are dropped.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
pub(crate) async fn start(config_path: &Path) -> eyre::Result<()> {
    let (app_state, mut hosts) =
        state::initialize_state(config_path, state::docker_connector()).await?;
    start_config_watcher(&app_state);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = hosts.next_ready(), if hosts.has_pending() => {
                if !hosts.has_pending() {
                    info!("Monitoring {} host(s)", hosts.running().len());
                }
            }
        }
    }

    info!("Received shutdown, shutting down");
    hosts.shutdown().await;
    Ok(())
}
