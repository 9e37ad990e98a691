//! Per-host cache of engine metadata and container records.

use alloc::{
    string::{String, ToString as _},
    sync::Arc,
    vec::Vec,
};
use core::time::Duration;
use std::collections::HashMap;

use futures::future;
use thiserror::Error as ThisError;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{
    container::ContainerRecord,
    notifier::{HostEvent, Notifier},
};
use crate::engine::{DockerEngine, Engine, EngineError, VersionInfo};

/// Container name => record. Only ever grows.
pub type ContainerMap = HashMap<String, Arc<ContainerRecord>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("Poll interval must be greater than zero")]
pub struct InvalidInterval;

/// Errors returned while setting up a [`HostCache`].
#[derive(Debug, ThisError)]
pub enum SetupError {
    /// The engine could not be reached. Setup should be retried later.
    #[error("Container engine at {endpoint} is not ready, retry setup later")]
    NotReady {
        endpoint: String,
        #[source]
        source: EngineError,
    },
    #[error(transparent)]
    InvalidInterval(#[from] InvalidInterval),
}

/// Outcome of one [`HostCache::refresh`], mostly for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Whether fresh version info was stored.
    pub version_updated: bool,
    /// Number of containers the engine listed, `None` if listing failed.
    pub listed: Option<usize>,
    /// Containers whose refresh failed this tick.
    pub failed: Vec<String>,
    /// Number of subscribers the update notification reached.
    pub notified: usize,
}

/// Cached state of one configured engine endpoint.
///
/// Shared as `Arc<HostCache>` between the poller, the entities and command handlers.
pub struct HostCache {
    endpoint: String,
    engine: Arc<dyn Engine>,
    version_info: watch::Sender<VersionInfo>,
    containers: watch::Sender<ContainerMap>,
    poll_interval: watch::Sender<Duration>,
    notifier: Notifier,
}

impl core::fmt::Debug for HostCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostCache")
            .field("endpoint", &self.endpoint)
            .field("containers", &self.container_names())
            .field("poll_interval", &self.poll_interval())
            .finish_non_exhaustive()
    }
}

impl HostCache {
    /// Connect to the Docker engine at `endpoint` and verify it answers.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::NotReady`] if the endpoint is malformed or unreachable, and
    /// [`SetupError::InvalidInterval`] for a zero poll interval.
    pub async fn configure(endpoint: &str, poll_interval: Duration) -> Result<Self, SetupError> {
        Self::connect_with(endpoint, poll_interval, |endpoint| {
            let engine: Arc<dyn Engine> = Arc::new(DockerEngine::connect(endpoint)?);
            Ok(engine)
        })
        .await
    }

    /// Like [`HostCache::configure`], building the engine client with `connect`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::NotReady`] if `connect` fails or the engine doesn't answer a ping,
    /// and [`SetupError::InvalidInterval`] for a zero poll interval.
    pub async fn connect_with<F>(
        endpoint: &str,
        poll_interval: Duration,
        connect: F,
    ) -> Result<Self, SetupError>
    where
        F: FnOnce(&str) -> Result<Arc<dyn Engine>, EngineError>,
    {
        let engine = connect(endpoint).map_err(|source| {
            error!("Can not connect to Docker ({source})");
            SetupError::NotReady {
                endpoint: endpoint.to_string(),
                source,
            }
        })?;
        Self::with_engine(endpoint, engine, poll_interval).await
    }

    /// Like [`HostCache::configure`], with an already constructed engine.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::NotReady`] if the engine doesn't answer a ping, and
    /// [`SetupError::InvalidInterval`] for a zero poll interval.
    pub async fn with_engine(
        endpoint: &str,
        engine: Arc<dyn Engine>,
        poll_interval: Duration,
    ) -> Result<Self, SetupError> {
        if poll_interval.is_zero() {
            return Err(InvalidInterval.into());
        }
        if let Err(source) = engine.ping().await {
            error!("Can not connect to Docker ({source})");
            return Err(SetupError::NotReady {
                endpoint: endpoint.to_string(),
                source,
            });
        }
        info!("Successfully connected to Docker at {endpoint}");
        Ok(Self {
            endpoint: endpoint.to_string(),
            engine,
            version_info: watch::Sender::new(VersionInfo::default()),
            containers: watch::Sender::new(ContainerMap::new()),
            poll_interval: watch::Sender::new(poll_interval),
            notifier: Notifier::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Last successfully fetched host metadata.
    #[must_use]
    pub fn version_info(&self) -> VersionInfo {
        self.version_info.borrow().clone()
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<ContainerRecord>> {
        self.containers.borrow().get(name).cloned()
    }

    /// Every container name observed so far, sorted.
    #[must_use]
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.containers.borrow().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Every record observed so far, sorted by name.
    #[must_use]
    pub fn containers(&self) -> Vec<Arc<ContainerRecord>> {
        let mut records: Vec<_> = self.containers.borrow().values().cloned().collect();
        records.sort_unstable_by(|a, b| a.name().cmp(b.name()));
        records
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        *self.poll_interval.borrow()
    }

    /// Change the poll interval. A running [`Poller`](super::Poller) drops its pending timer and
    /// reschedules with the new interval.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInterval`] if `interval` is zero.
    pub fn set_poll_interval(&self, interval: Duration) -> Result<(), InvalidInterval> {
        if interval.is_zero() {
            return Err(InvalidInterval);
        }
        let changed = self.poll_interval.send_if_modified(|current| {
            let changed = *current != interval;
            *current = interval;
            changed
        });
        if changed {
            info!("Poll interval for {} set to {interval:?}", self.endpoint);
        }
        Ok(())
    }

    pub(super) fn subscribe_poll_interval(&self) -> watch::Receiver<Duration> {
        self.poll_interval.subscribe()
    }

    /// One poll tick: refresh host metadata, then every listed container, then notify.
    ///
    /// Each step is isolated from failures of the others and the notification is always sent.
    #[tracing::instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn refresh(&self) -> PollSummary {
        let version_updated = self.update_host_info().await;
        let (listed, failed) = match self.update_containers().await {
            Ok((listed, failed)) => (Some(listed), failed),
            Err(e) => {
                error!("Unable to fetch containers from Docker ({e})");
                (None, Vec::new())
            }
        };
        let notified = self.notifier.publish(HostEvent::Updated);
        debug!("Docker data updated");
        PollSummary {
            version_updated,
            listed,
            failed,
            notified,
        }
    }

    async fn update_host_info(&self) -> bool {
        match self.engine.version().await {
            Ok(info) => {
                self.version_info.send_replace(info);
                true
            }
            Err(e) => {
                error!("Cannot get Docker version ({e})");
                false
            }
        }
    }

    async fn update_containers(&self) -> Result<(usize, Vec<String>), EngineError> {
        debug!("Updating containers...");
        let names = self.engine.list_containers(true).await?;
        let records: Vec<_> = names.iter().map(|name| self.record_for(name)).collect();

        let results = future::join_all(records.iter().map(|record| async move {
            (record.name(), record.refresh().await)
        }))
        .await;
        let failed = results
            .into_iter()
            .filter(|&(_, ref res)| res.is_err())
            .map(|(name, _)| name.to_string())
            .collect();
        Ok((names.len(), failed))
    }

    fn record_for(&self, name: &str) -> Arc<ContainerRecord> {
        if let Some(record) = self.lookup(name) {
            return record;
        }
        debug!("Found container: {name}");
        let fresh = Arc::new(ContainerRecord::new(name, Arc::clone(&self.engine)));
        let mut record = Arc::clone(&fresh);
        self.containers.send_modify(|map| {
            record = Arc::clone(map.entry(name.to_string()).or_insert(fresh));
        });
        record
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::engine::{MemoryContainer, MemoryEngine};

    const STARTED: &str = "2024-11-02T08:15:42Z";

    fn version(v: &str) -> VersionInfo {
        VersionInfo {
            version: Some(v.to_string()),
            api_version: Some("1.47".to_string()),
            os: Some("linux".to_string()),
            arch: Some("amd64".to_string()),
            kernel: None,
        }
    }

    async fn cache_for(engine: &Arc<MemoryEngine>) -> HostCache {
        HostCache::with_engine(
            "memory://",
            Arc::clone(engine) as Arc<dyn Engine>,
            Duration::from_secs(30),
        )
        .await
        .unwrap()
    }

    fn count_notifications(cache: &HostCache) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        cache.notifier().subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[tokio::test]
    async fn unreachable_engine_is_not_ready() {
        let engine = Arc::new(MemoryEngine::default());
        engine.set_reachable(false);
        let res = HostCache::with_engine(
            "memory://",
            Arc::clone(&engine) as Arc<dyn Engine>,
            Duration::from_secs(30),
        )
        .await;
        assert!(matches!(res, Err(SetupError::NotReady { .. })));
        assert_eq!(engine.list_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_endpoint_is_not_ready() {
        let res = HostCache::configure("not-an-endpoint", Duration::from_secs(30)).await;
        assert!(
            matches!(
                res,
                Err(SetupError::NotReady {
                    source: EngineError::MalformedEndpoint(_),
                    ..
                })
            ),
            "malformed endpoints should be reported as not ready"
        );
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let engine = Arc::new(MemoryEngine::default());
        let res = HostCache::with_engine("memory://", engine, Duration::ZERO).await;
        assert!(matches!(res, Err(SetupError::InvalidInterval(_))));
    }

    #[tokio::test]
    async fn refresh_populates_version_and_containers() {
        let engine = Arc::new(
            MemoryEngine::new(version("27.3.1"))
                .with_container("web", MemoryContainer::running("nginx:1", STARTED))
                .with_container("db", MemoryContainer::exited("postgres:16", STARTED)),
        );
        let cache = cache_for(&engine).await;
        let summary = cache.refresh().await;

        assert!(summary.version_updated);
        assert_eq!(summary.listed, Some(2));
        assert!(summary.failed.is_empty());
        assert_eq!(cache.version_info(), version("27.3.1"));
        assert_eq!(cache.container_names(), ["db", "web"]);
        assert!(cache.lookup("web").unwrap().is_running());
        assert!(!cache.lookup("db").unwrap().is_running());
        assert!(cache.lookup("cache").is_none());
    }

    #[tokio::test]
    async fn version_failure_keeps_previous_info() {
        let engine = Arc::new(MemoryEngine::new(version("27.3.1")));
        let cache = cache_for(&engine).await;
        cache.refresh().await;

        engine.set_version(version("28.0.0"));
        engine.set_version_failing(true);
        let summary = cache.refresh().await;
        assert!(!summary.version_updated);
        assert_eq!(cache.version_info(), version("27.3.1"));
    }

    #[tokio::test]
    async fn refresh_is_idempotent_for_unchanged_engine() {
        let engine = Arc::new(
            MemoryEngine::new(version("27.3.1"))
                .with_container("web", MemoryContainer::running("nginx:1", STARTED))
                .with_container("db", MemoryContainer::exited("postgres:16", STARTED)),
        );
        let cache = cache_for(&engine).await;
        let render = |cache: &HostCache| {
            cache
                .containers()
                .iter()
                .map(|r| serde_json::to_string(&r.snapshot()).unwrap())
                .collect::<Vec<_>>()
        };

        cache.refresh().await;
        let first = render(&cache);
        cache.refresh().await;
        assert_eq!(render(&cache), first);
    }

    #[tokio::test]
    async fn vanished_containers_are_retained() {
        let engine = Arc::new(
            MemoryEngine::default()
                .with_container("web", MemoryContainer::running("nginx:1", STARTED))
                .with_container("db", MemoryContainer::running("postgres:16", STARTED)),
        );
        let cache = cache_for(&engine).await;
        cache.refresh().await;
        let db_before = cache.lookup("db").unwrap().snapshot();

        engine.remove_container("db");
        let summary = cache.refresh().await;
        assert_eq!(summary.listed, Some(1));
        assert_eq!(cache.container_names(), ["db", "web"]);
        assert_eq!(cache.lookup("db").unwrap().snapshot(), db_before);
    }

    #[tokio::test]
    async fn failing_container_does_not_block_others_or_notification() {
        let engine = Arc::new(
            MemoryEngine::default()
                .with_container("a", MemoryContainer::exited("alpine:3", STARTED))
                .with_container("b", MemoryContainer::running("busybox:1", STARTED)),
        );
        let cache = cache_for(&engine).await;
        cache.refresh().await;
        let notifications = count_notifications(&cache);

        engine.insert_container("a", MemoryContainer::running("alpine:3", STARTED));
        engine.set_inspect_failing("b", true);
        let summary = cache.refresh().await;

        assert_eq!(summary.failed, ["b"]);
        assert!(cache.lookup("a").unwrap().is_running());
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert_eq!(summary.notified, 1);
    }

    #[tokio::test]
    async fn unreachable_engine_still_notifies() {
        let engine = Arc::new(
            MemoryEngine::default().with_container("web", MemoryContainer::running("nginx:1", STARTED)),
        );
        let cache = cache_for(&engine).await;
        cache.refresh().await;
        let notifications = count_notifications(&cache);

        engine.set_reachable(false);
        let summary = cache.refresh().await;
        assert_eq!(summary.listed, None);
        assert!(!summary.version_updated);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert!(cache.lookup("web").unwrap().is_running());
    }

    #[tokio::test]
    async fn set_poll_interval_rejects_zero() {
        let engine = Arc::new(MemoryEngine::default());
        let cache = cache_for(&engine).await;
        assert_eq!(cache.set_poll_interval(Duration::ZERO), Err(InvalidInterval));
        cache.set_poll_interval(Duration::from_secs(5)).unwrap();
        assert_eq!(cache.poll_interval(), Duration::from_secs(5));
    }
}
