//! Configuration file watching and reloading.
//!
//! Only `scan_interval` can change while the monitor runs. Everything else is reported and
//! ignored until the next restart.

use alloc::sync::Arc;
use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{OptionExt as _, Result, WrapErr as _};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

use super::{
    cache::HostCache,
    state::{ConfigRx, ConfigTx},
};
use crate::config::{self, HostEntry, MonitorConfig};

/// Merge a freshly loaded config into the running one.
///
/// Returns the config to run with (the previous one with new scan intervals applied) and whether
/// `new` contained changes that can't be applied at runtime.
fn effective_config(prev: &MonitorConfig, new: &MonitorConfig) -> (MonitorConfig, bool) {
    let mut effective = prev.clone();
    let mut unsupported = new.hosts.len() != prev.hosts.len();
    for (name, entry) in &new.hosts {
        match effective.hosts.get_mut(name) {
            Some(running) => {
                unsupported |= running.differs_beyond_interval(entry);
                running.scan_interval = entry.scan_interval;
            }
            None => {
                warn!("Host {name} was added to the config, restart to set it up");
                unsupported = true;
            }
        }
    }
    (effective, unsupported)
}

/// Reload the config file at `path` and publish the applicable part of it on `tx`.
async fn process_config_change(path: &Path, tx: &ConfigTx, rx: &ConfigRx) -> Result<()> {
    info!("Config file modified. Reloading...");
    let prev = rx.borrow().clone();
    let new_config = config::load(path)
        .await
        .wrap_err(format!("Failed to reload config at: {}", path.display()))?;
    let (effective, unsupported) = effective_config(&prev, &new_config);

    if unsupported {
        warn!(
            "Detected changes besides scan_interval during runtime. Such changes are unsupported and will be ignored until restart."
        );
    }

    if effective == *prev {
        info!("No applicable (scan_interval) changes detected in config.");
    } else {
        tx.send(Arc::new(effective))
            .wrap_err("Failed to send updated config through watch channel")?;
        info!("Applied scan_interval changes from config file.");
    }
    Ok(())
}

/// Keep the poll interval of host `name` in line with the config published on `config_rx`.
///
/// The current config is applied first, since it may have changed while the host was being set
/// up. Returns once the sender is gone.
pub(super) async fn apply_interval_changes(
    name: String,
    cache: Arc<HostCache>,
    mut config_rx: ConfigRx,
) {
    loop {
        let interval = config_rx
            .borrow_and_update()
            .hosts
            .get(&name)
            .map(HostEntry::poll_interval);
        if let Some(interval) = interval
            && let Err(e) = cache.set_poll_interval(interval)
        {
            error!("Cannot change poll interval of {name}: {e}");
        }
        if config_rx.changed().await.is_err() {
            break;
        }
    }
}

/// Whether a file event at `event_path` concerns the config file at `config_path`.
///
/// Editors often write a temp file and rename it over the config, so besides the path itself
/// the canonical path and the bare file name count as well.
fn is_config_event(event_path: &Path, config_path: &Path) -> bool {
    if event_path == config_path {
        return true;
    }
    if let (Ok(event), Ok(config)) = (fs::canonicalize(event_path), fs::canonicalize(config_path))
        && event == config
    {
        return true;
    }
    event_path.file_name().is_some() && event_path.file_name() == config_path.file_name()
}

/// Watches a config file for modifications and publishes reloaded configs on `tx`.
///
/// # Errors
///
/// Returns an error if the file watcher cannot be set up.
pub(super) async fn watch_config_file(path: PathBuf, tx: ConfigTx) -> Result<()> {
    let (raw_tx, mut raw_rx) = unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res
                && raw_tx.send(event).is_err()
            {
                error!("Failed to send event to config watcher channel");
            }
        },
        notify::Config::default(),
    )
    .wrap_err("Failed to create file watcher")?;

    let dir = path
        .parent()
        .ok_or_eyre("Config file must have a parent directory")?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .wrap_err("Failed to watch config directory")?;

    let rx = tx.subscribe();

    while let Some(event) = raw_rx.recv().await {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            continue;
        }
        let matches_config = event
            .paths
            .iter()
            .any(|event_path| is_config_event(event_path, &path));

        // A half-written file shows up as a parse error; the next event retries.
        if matches_config && let Err(e) = process_config_change(&path, &tx, &rx).await {
            error!("Failed to process config change: {e:?}");
        }
    }
    Ok(())
}
