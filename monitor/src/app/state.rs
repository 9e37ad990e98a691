use alloc::{string::String, sync::Arc};
use std::path::{Path, PathBuf};

use eyre::WrapErr as _;
use tokio::{
    sync::watch,
    task::{JoinHandle, JoinSet},
    time::sleep,
};
use tracing::{Instrument as _, error, info, warn};

use super::{
    cache::{HostCache, SetupError},
    config_watcher::apply_interval_changes,
    runtime::{Poller, Renderer},
};
use crate::{
    config::{HostEntry, MonitorConfig, load},
    engine::{DockerEngine, Engine, EngineError},
    entities::EntitySet,
};

pub(crate) type ConfigRx = watch::Receiver<Arc<MonitorConfig>>;
pub(super) type ConfigTx = watch::Sender<Arc<MonitorConfig>>;

/// Builds the engine client for a configured endpoint.
pub(super) type Connector =
    Arc<dyn Fn(&str) -> Result<Arc<dyn Engine>, EngineError> + Send + Sync>;

/// Connects configured endpoints to Docker daemons.
pub(super) fn docker_connector() -> Connector {
    Arc::new(|endpoint: &str| -> Result<Arc<dyn Engine>, EngineError> {
        Ok(Arc::new(DockerEngine::connect(endpoint)?))
    })
}

/// The running pieces of one configured host.
#[derive(Debug)]
pub(crate) struct HostRuntime {
    pub name: String,
    cache: Arc<HostCache>,
    poller: Poller,
    renderer: Renderer,
    interval_follower: Option<JoinHandle<()>>,
}

impl HostRuntime {
    /// Apply scan interval changes published on `config_rx` to this host.
    fn follow_config(&mut self, config_rx: ConfigRx) {
        let follower =
            apply_interval_changes(self.name.clone(), Arc::clone(&self.cache), config_rx);
        self.interval_follower = Some(tokio::spawn(follower.in_current_span()));
    }

    /// Stop following the config, then the poll timer, then the renderer.
    pub async fn shutdown(self) {
        if let Some(follower) = self.interval_follower {
            follower.abort();
        }
        self.poller.shutdown().await;
        if self.renderer.shutdown().await.is_none() {
            warn!("Renderer of {} ended abnormally", self.name);
        }
        info!("Host {} torn down", self.name);
    }
}

/// Every configured host, either running or still waiting for its engine.
///
/// Each host is set up by its own task, so an engine that isn't ready never holds up the others.
#[derive(Debug)]
pub(crate) struct HostSet {
    setups: JoinSet<eyre::Result<HostRuntime>>,
    running: Vec<HostRuntime>,
}

impl HostSet {
    pub fn has_pending(&self) -> bool {
        !self.setups.is_empty()
    }

    pub fn running(&self) -> &[HostRuntime] {
        &self.running
    }

    /// Wait until the next pending host has finished its setup, successfully or not.
    ///
    /// Returns `false` right away if no setup is pending. Cancel safe.
    pub async fn next_ready(&mut self) -> bool {
        let Some(res) = self.setups.join_next().await else {
            return false;
        };
        match res {
            Ok(Ok(host)) => {
                info!("Monitoring host {}", host.name);
                self.running.push(host);
            }
            Ok(Err(e)) => error!("{e:?}"),
            Err(e) => error!("Host setup task failed: {e}"),
        }
        true
    }

    /// Abort the setups still waiting for their engine, then tear down the running hosts.
    pub async fn shutdown(mut self) {
        self.setups.shutdown().await;
        for host in self.running {
            host.shutdown().await;
        }
    }
}

/// Application state shared by the background tasks.
#[derive(Debug)]
pub(crate) struct AppState {
    /// Path to the configuration file, watched for changes.
    pub config_path: PathBuf,

    /// Publishes the effective config to the hosts, updated when the file changes.
    pub config_tx: ConfigTx,
}

/// Set up one host, retrying once per scan interval until its engine answers.
///
/// The retry loop is the only place a not ready engine is waited for; poll ticks never retry.
#[tracing::instrument(skip(entry, connector, config_rx), fields(endpoint = %entry.endpoint))]
pub(super) async fn setup_host(
    name: String,
    entry: HostEntry,
    connector: Connector,
    config_rx: ConfigRx,
) -> eyre::Result<HostRuntime> {
    let cache = loop {
        match HostCache::connect_with(&entry.endpoint, entry.poll_interval(), &*connector).await {
            Ok(cache) => break Arc::new(cache),
            Err(e @ SetupError::NotReady { .. }) => {
                warn!("{e}, retrying in {:?}", entry.poll_interval());
                sleep(entry.poll_interval()).await;
            }
            Err(e @ SetupError::InvalidInterval(_)) => {
                return Err(e).wrap_err(format!("Failed to set up host {name}"));
            }
        }
    };
    let mut host = start_host(&name, &entry, cache).await;
    host.follow_config(config_rx);
    Ok(host)
}

/// Initial refresh, entity creation and background tasks for an already set up cache.
pub(crate) async fn start_host(name: &str, entry: &HostEntry, cache: Arc<HostCache>) -> HostRuntime {
    cache.refresh().await;
    let entities = EntitySet::build(name, entry, &cache);
    for state in entities.states() {
        info!(
            entity = %state.unique_id,
            state = state.state.as_deref().unwrap_or("unknown"),
            "Added {}",
            state.name
        );
    }
    HostRuntime {
        name: name.to_string(),
        poller: Poller::spawn(Arc::clone(&cache)),
        renderer: Renderer::spawn(entities),
        cache,
        interval_follower: None,
    }
}

/// Load the config file and start setting up every configured host.
///
/// Returns as soon as the setups are spawned; use [`HostSet::next_ready`] to collect the hosts.
#[tracing::instrument(skip_all)]
pub(super) async fn initialize_state(
    config_path: &Path,
    connector: Connector,
) -> eyre::Result<(AppState, HostSet)> {
    let initial_config = Arc::new(load(config_path).await?);
    if initial_config.hosts.is_empty() {
        warn!("No hosts configured in {}", config_path.display());
    }

    let (config_tx, config_rx) = watch::channel(Arc::clone(&initial_config));

    let mut setups = JoinSet::new();
    for (name, entry) in &initial_config.hosts {
        let setup = setup_host(
            name.clone(),
            entry.clone(),
            Arc::clone(&connector),
            config_rx.clone(),
        );
        setups.spawn(setup.in_current_span());
    }

    let app_state = AppState {
        config_path: config_path.to_path_buf(),
        config_tx,
    };
    let hosts = HostSet {
        setups,
        running: Vec::new(),
    };
    Ok((app_state, hosts))
}
