//! Cached view of a single container.

use alloc::{
    string::{String, ToString as _},
    sync::Arc,
    vec::Vec,
};
use core::time::Duration;

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use thiserror::Error as ThisError;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    conditions::ContainerCondition,
    engine::{ContainerDetails, Engine, EngineError},
};

/// Grace period given to a container before the engine kills it on stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// The engine reported a start time we couldn't make sense of.
#[derive(Debug, ThisError)]
#[error("Invalid start time '{raw}' for container '{container}'")]
pub struct TimestampError {
    container: String,
    raw: String,
    #[source]
    source: chrono::ParseError,
}

/// Parse an engine timestamp and convert it to the local time zone.
fn parse_started_at(container: &str, raw: &str) -> Result<DateTime<Local>, TimestampError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Local))
        .map_err(|source| TimestampError {
            container: container.to_string(),
            raw: raw.to_string(),
            source,
        })
}

#[derive(Debug, Clone, Default)]
struct ContainerState {
    status: String,
    running: bool,
    started_at: Option<DateTime<Local>>,
    image: String,
}

/// Read-only projection of a container, in the fixed order status, uptime, image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    #[serde(rename = "container_status")]
    pub status: String,
    #[serde(rename = "container_uptime")]
    pub uptime: Option<DateTime<Local>>,
    #[serde(rename = "container_image")]
    pub image: String,
}

impl ContainerInfo {
    /// The value a sensor for `condition` reports. Timestamps are rendered as RFC 3339.
    #[must_use]
    pub fn value(&self, condition: ContainerCondition) -> Option<String> {
        match condition {
            ContainerCondition::Status => Some(self.status.clone()),
            ContainerCondition::Uptime => self
                .uptime
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, false)),
            ContainerCondition::Image => Some(self.image.clone()),
        }
    }

    /// `(attribute key, value)` pairs for every condition, in snapshot order.
    #[must_use]
    pub fn attributes(&self) -> Vec<(&'static str, Option<String>)> {
        ContainerCondition::ALL
            .iter()
            .map(|&c| (c.descriptor().attribute_key, self.value(c)))
            .collect()
    }
}

/// One container as last observed on the engine.
///
/// All mutations go through a single `watch` channel, so readers always see a consistent state.
/// Commands and refreshes don't coordinate beyond that: the last write wins.
pub struct ContainerRecord {
    name: String,
    engine: Arc<dyn Engine>,
    state: watch::Sender<ContainerState>,
}

impl core::fmt::Debug for ContainerRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContainerRecord")
            .field("name", &self.name)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ContainerRecord {
    pub(crate) fn new(name: &str, engine: Arc<dyn Engine>) -> Self {
        let (state, _) = watch::channel(ContainerState::default());
        Self {
            name: name.to_string(),
            engine,
            state,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    #[must_use]
    pub fn status(&self) -> String {
        self.state.borrow().status.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> ContainerInfo {
        let state = self.state.borrow();
        ContainerInfo {
            status: state.status.clone(),
            uptime: state.started_at,
            image: state.image.clone(),
        }
    }

    /// Re-fetch this container from the engine.
    ///
    /// On an engine error nothing is changed. A start time that fails to parse keeps the
    /// previous value while the other fields are still updated.
    ///
    /// # Errors
    ///
    /// Returns the engine error after logging it, so callers can account for failed refreshes.
    #[tracing::instrument(level = "debug", skip(self), fields(container = %self.name))]
    pub async fn refresh(&self) -> Result<(), EngineError> {
        match self.engine.inspect_container(&self.name).await {
            Ok(details) => {
                self.apply(details);
                Ok(())
            }
            Err(e) => {
                error!("Cannot refresh container {}: {}", self.name, e);
                Err(e)
            }
        }
    }

    fn apply(&self, details: ContainerDetails) {
        let ContainerDetails {
            status,
            started_at,
            image_tags,
        } = details;

        let parsed = started_at.map(|raw| parse_started_at(&self.name, &raw));
        let image = image_tags.into_iter().next().unwrap_or_default();
        if image.is_empty() {
            debug!("Container {} has an untagged image", self.name);
        }

        self.state.send_modify(|state| {
            state.running = status == "running";
            state.status = status;
            match parsed {
                Some(Ok(ts)) => state.started_at = Some(ts),
                Some(Err(ref e)) => warn!("{e}, keeping previous value"),
                None => {}
            }
            state.image = image;
        });
    }

    /// Mark the container as running right away, then ask the engine to start it.
    ///
    /// A failing command is logged; the optimistic state stays until the next refresh.
    pub async fn start(&self) {
        info!("Starting container {}", self.name);
        self.state.send_modify(|state| state.running = true);
        if let Err(e) = self.engine.start_container(&self.name).await {
            error!("Failed to start container {}: {}", self.name, e);
        }
    }

    /// Mark the container as stopped right away, then ask the engine to stop it within `timeout`.
    pub async fn stop(&self, timeout: Duration) {
        info!("Stopping container {}", self.name);
        self.state.send_modify(|state| state.running = false);
        if let Err(e) = self.engine.stop_container(&self.name, timeout).await {
            error!("Failed to stop container {}: {}", self.name, e);
        }
    }
}
