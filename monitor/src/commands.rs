//! One-shot commands: query or control the configured hosts once and exit.

use alloc::{string::String, sync::Arc, vec::Vec};
use core::time::Duration;
use std::{io, path::Path};

use eyre::{WrapErr as _, eyre};
use serde::Serialize;
use tracing::info;

use crate::{
    app::HostCache,
    config::{HostEntry, MonitorConfig, load},
    entities::{EntitySet, EntityState},
};

/// Entity states of one host, as printed by `status`.
#[derive(Debug, Serialize)]
pub struct HostReport {
    pub host: String,
    pub endpoint: String,
    pub entities: Vec<EntityState>,
}

/// Connect to a single host and run one refresh. Unlike the monitor, a host that isn't ready is
/// an error right away.
async fn connect(name: &str, entry: &HostEntry) -> eyre::Result<Arc<HostCache>> {
    let cache = HostCache::configure(&entry.endpoint, entry.poll_interval())
        .await
        .wrap_err(format!("Failed to set up host {name}"))?;
    let cache = Arc::new(cache);
    cache.refresh().await;
    Ok(cache)
}

fn host_entry<'cfg>(config: &'cfg MonitorConfig, name: &str) -> eyre::Result<&'cfg HostEntry> {
    config.hosts.get(name).ok_or_else(|| {
        let mut known: Vec<_> = config.hosts.keys().map(String::as_str).collect();
        known.sort_unstable();
        eyre!("Unknown host '{name}', configured hosts: {}", known.join(", "))
    })
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
    serde_json::to_writer_pretty(io::stdout().lock(), value)
        .wrap_err("Failed to write JSON to stdout")?;
    println!();
    Ok(())
}

/// Poll every configured host once and print its entities.
///
/// # Errors
///
/// Returns an error if the config can't be loaded or any host can't be reached.
pub async fn status(config_path: &Path) -> eyre::Result<()> {
    let config = load(config_path).await?;
    let mut names: Vec<_> = config.hosts.keys().cloned().collect();
    names.sort_unstable();

    let mut reports = Vec::with_capacity(names.len());
    for name in names {
        let entry = host_entry(&config, &name)?;
        let cache = connect(&name, entry).await?;
        reports.push(HostReport {
            endpoint: entry.endpoint.clone(),
            entities: EntitySet::build(&name, entry, &cache).states(),
            host: name,
        });
    }
    print_json(&reports)
}

/// What [`control`] does to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    /// Stop, giving the container this long to exit before it is killed.
    Stop(Duration),
}

/// Start or stop a container and print its switch afterwards.
///
/// # Errors
///
/// Returns an error if the config can't be loaded, the host is unknown or unreachable, or the
/// container doesn't exist on the host.
pub async fn control(
    config_path: &Path,
    host: &str,
    container: &str,
    action: Action,
) -> eyre::Result<()> {
    let config = load(config_path).await?;
    let entry = host_entry(&config, host)?;
    let cache = connect(host, entry).await?;
    let record = cache
        .lookup(container)
        .ok_or_else(|| eyre!("Container '{container}' not found on host {host}"))?;

    match action {
        Action::Start => record.start().await,
        Action::Stop(timeout) => record.stop(timeout).await,
    }
    if let Err(e) = record.refresh().await {
        info!("Container state not confirmed yet: {e}");
    }

    let entities = EntitySet::build(host, entry, &cache);
    let switch = entities
        .switch(container)
        .ok_or_else(|| eyre!("No switch for container '{container}'"))?;
    print_json(&switch.state())
}
