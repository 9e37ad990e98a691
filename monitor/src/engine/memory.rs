//! In-process simulated engine.
//!
//! Used by the `demo` command to run the monitor without a daemon, and by tests to drive the
//! cache through failure scenarios deterministically.

use alloc::string::{String, ToString as _};
use core::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use super::{ContainerDetails, Engine, EngineError, VersionInfo};

const MEMORY_ENDPOINT: &str = "memory://";

/// State of a simulated container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryContainer {
    pub status: String,
    pub started_at: Option<String>,
    pub image_tags: Vec<String>,
}

impl MemoryContainer {
    /// A running container started at `started_at` (RFC 3339).
    pub fn running(image: &str, started_at: &str) -> Self {
        Self {
            status: "running".to_string(),
            started_at: Some(started_at.to_string()),
            image_tags: vec![image.to_string()],
        }
    }

    /// A container that has exited after running since `started_at`.
    pub fn exited(image: &str, started_at: &str) -> Self {
        Self {
            status: "exited".to_string(),
            ..Self::running(image, started_at)
        }
    }
}

/// Simulated container engine with failure injection.
#[derive(Debug)]
pub struct MemoryEngine {
    reachable: AtomicBool,
    version_failing: AtomicBool,
    version: Mutex<VersionInfo>,
    containers: Mutex<BTreeMap<String, MemoryContainer>>,
    inspect_failing: Mutex<HashSet<String>>,
    command_latency: Duration,
    list_calls: AtomicUsize,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(VersionInfo::default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryEngine {
    #[must_use]
    pub fn new(version: VersionInfo) -> Self {
        Self {
            reachable: AtomicBool::new(true),
            version_failing: AtomicBool::new(false),
            version: Mutex::new(version),
            containers: Mutex::new(BTreeMap::new()),
            inspect_failing: Mutex::new(HashSet::new()),
            command_latency: Duration::ZERO,
            list_calls: AtomicUsize::new(0),
        }
    }

    /// A small host with a handful of containers, used by the demo mode.
    #[must_use]
    pub fn demo() -> Self {
        Self::new(VersionInfo {
            version: Some("27.3.1".to_string()),
            api_version: Some("1.47".to_string()),
            os: Some("linux".to_string()),
            arch: Some("amd64".to_string()),
            kernel: Some("6.6.51-demo".to_string()),
        })
        .with_container(
            "homeassistant",
            MemoryContainer::running(
                "ghcr.io/home-assistant/home-assistant:stable",
                "2024-11-02T08:15:42.123456789Z",
            ),
        )
        .with_container(
            "mosquitto",
            MemoryContainer::running("eclipse-mosquitto:2", "2024-11-02T08:15:40.5Z"),
        )
        .with_container(
            "backup",
            MemoryContainer::exited("restic/restic:0.17.1", "2024-11-03T02:00:00Z"),
        )
        .with_command_latency(Duration::from_millis(250))
    }

    #[must_use]
    pub fn with_container(self, name: &str, container: MemoryContainer) -> Self {
        self.insert_container(name, container);
        self
    }

    /// Delay applied to start and stop commands.
    #[must_use]
    pub const fn with_command_latency(mut self, latency: Duration) -> Self {
        self.command_latency = latency;
        self
    }

    pub fn insert_container(&self, name: &str, container: MemoryContainer) {
        lock(&self.containers).insert(name.to_string(), container);
    }

    pub fn remove_container(&self, name: &str) -> Option<MemoryContainer> {
        lock(&self.containers).remove(name)
    }

    #[must_use]
    pub fn container(&self, name: &str) -> Option<MemoryContainer> {
        lock(&self.containers).get(name).cloned()
    }

    pub fn set_version(&self, version: VersionInfo) {
        *lock(&self.version) = version;
    }

    /// While unreachable every call fails with a connection error.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_version_failing(&self, failing: bool) {
        self.version_failing.store(failing, Ordering::SeqCst);
    }

    /// Make inspecting `name` fail, as if the daemon errored on that container only.
    pub fn set_inspect_failing(&self, name: &str, failing: bool) {
        let mut set = lock(&self.inspect_failing);
        if failing {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    /// Number of container listings served so far, which equals the number of poll ticks.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), EngineError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Connection {
                endpoint: MEMORY_ENDPOINT.to_string(),
                source: "simulated engine is unreachable".into(),
            })
        }
    }

    async fn simulate_latency(&self) {
        if !self.command_latency.is_zero() {
            tokio::time::sleep(self.command_latency).await;
        }
    }

    fn set_status(&self, name: &str, status: &str) -> Result<(), EngineError> {
        let mut containers = lock(&self.containers);
        let container = containers
            .get_mut(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        if status == "running" && container.status != "running" {
            container.started_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true));
        }
        container.status = status.to_string();
        Ok(())
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.check_reachable()
    }

    async fn version(&self) -> Result<VersionInfo, EngineError> {
        self.check_reachable()?;
        if self.version_failing.load(Ordering::SeqCst) {
            return Err(EngineError::request(
                "version",
                "simulated version failure",
            ));
        }
        Ok(lock(&self.version).clone())
    }

    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<String>, EngineError> {
        self.check_reachable()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.containers)
            .iter()
            .filter(|&(_, c)| include_stopped || c.status == "running")
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, EngineError> {
        self.check_reachable()?;
        if lock(&self.inspect_failing).contains(name) {
            return Err(EngineError::request(
                format!("inspect container {name}"),
                "simulated inspect failure",
            ));
        }
        let container = self
            .container(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        Ok(ContainerDetails {
            status: container.status,
            started_at: container.started_at,
            image_tags: container.image_tags,
        })
    }

    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        self.simulate_latency().await;
        self.check_reachable()?;
        self.set_status(name, "running")
    }

    async fn stop_container(&self, name: &str, _timeout: Duration) -> Result<(), EngineError> {
        self.simulate_latency().await;
        self.check_reachable()?;
        self.set_status(name, "exited")
    }
}
