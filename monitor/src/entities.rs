//! Sensors and switches projected from a [`HostCache`].
//!
//! Entities hold no state of their own beyond identifiers; every read goes to the cache, so a
//! rendered [`EntityState`] always reflects the latest poll tick (or the latest optimistic update).

use alloc::{
    string::{String, ToString as _},
    sync::Arc,
    vec::Vec,
};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    app::{ContainerInfo, ContainerRecord, DEFAULT_STOP_TIMEOUT, HostCache},
    conditions::{ContainerCondition, HostCondition},
    config::HostEntry,
    engine::VersionInfo,
};

const DOMAIN: &str = "docker";
const MANUFACTURER: &str = "Docker";
const SWITCH_ICON: &str = "mdi:docker";

/// Upper-cases the first letter of every word and lower-cases the rest.
///
/// A word starts at any letter that doesn't follow another letter, so `my-app2x` becomes
/// `My-App2X`.
#[must_use]
pub fn title(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_word = false;
    for ch in name.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Sensor,
    Switch,
}

/// Groups entities under a device in the consumer's UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub sw_version: Option<String>,
}

impl DeviceInfo {
    fn host(host_name: &str, cache: &HostCache) -> Self {
        Self {
            identifiers: vec![DOMAIN.to_string(), host_name.to_string()],
            name: host_name.to_string(),
            manufacturer: MANUFACTURER,
            model: "Host",
            sw_version: cache.version_info().version,
        }
    }

    fn container(host_name: &str, container: &str, name: String, cache: &HostCache) -> Self {
        Self {
            identifiers: vec![
                DOMAIN.to_string(),
                host_name.to_string(),
                container.to_string(),
            ],
            name,
            manufacturer: MANUFACTURER,
            model: "Container",
            sw_version: cache.version_info().version,
        }
    }
}

/// Rendered view of one entity at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityState {
    pub unique_id: String,
    pub name: String,
    pub kind: EntityKind,
    /// Sensor value, or `on`/`off` for switches. `None` when the value is unknown.
    pub state: Option<String>,
    pub icon: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<ContainerInfo>,
    pub device: DeviceInfo,
}

fn host_value(info: &VersionInfo, condition: HostCondition) -> Option<String> {
    match condition {
        HostCondition::Version => info.version.clone(),
        HostCondition::ApiVersion => info.api_version.clone(),
        HostCondition::Os => info.os.clone(),
        HostCondition::Arch => info.arch.clone(),
    }
}

/// One piece of engine metadata, e.g. the engine version.
#[derive(Debug, Clone)]
pub struct HostSensor {
    host_name: String,
    condition: HostCondition,
    cache: Arc<HostCache>,
}

impl HostSensor {
    #[must_use]
    pub fn new(host_name: &str, condition: HostCondition, cache: Arc<HostCache>) -> Self {
        Self {
            host_name: host_name.to_string(),
            condition,
            cache,
        }
    }

    #[must_use]
    pub fn unique_id(&self) -> String {
        format!(
            "docker_{}_{}",
            self.host_name,
            self.condition.descriptor().display_name
        )
    }

    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "{} {}",
            self.host_name,
            self.condition.descriptor().display_name
        )
    }

    #[must_use]
    pub fn state(&self) -> EntityState {
        let descriptor = self.condition.descriptor();
        EntityState {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: EntityKind::Sensor,
            state: host_value(&self.cache.version_info(), self.condition),
            icon: descriptor.icon,
            unit: descriptor.unit,
            device_class: descriptor.device_class,
            attributes: None,
            device: DeviceInfo::host(&self.host_name, &self.cache),
        }
    }
}

/// One monitored condition of one container.
#[derive(Debug, Clone)]
pub struct ContainerSensor {
    host_name: String,
    condition: ContainerCondition,
    record: Arc<ContainerRecord>,
    cache: Arc<HostCache>,
}

impl ContainerSensor {
    #[must_use]
    pub fn new(
        host_name: &str,
        condition: ContainerCondition,
        record: Arc<ContainerRecord>,
        cache: Arc<HostCache>,
    ) -> Self {
        info!(
            "Initializing Docker sensor \"{}\" with parameter: {}",
            record.name(),
            condition.descriptor().display_name
        );
        Self {
            host_name: host_name.to_string(),
            condition,
            record,
            cache,
        }
    }

    #[must_use]
    pub fn unique_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.host_name,
            self.record.name(),
            self.condition.descriptor().display_name
        )
    }

    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "{} {}",
            title(self.record.name()),
            self.condition.descriptor().display_name
        )
    }

    #[must_use]
    pub fn state(&self) -> EntityState {
        let descriptor = self.condition.descriptor();
        EntityState {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: EntityKind::Sensor,
            state: self.record.snapshot().value(self.condition),
            icon: descriptor.icon,
            unit: descriptor.unit,
            device_class: descriptor.device_class,
            attributes: None,
            device: DeviceInfo::container(
                &self.host_name,
                self.record.name(),
                title(self.record.name()),
                &self.cache,
            ),
        }
    }
}

/// On/off control of one container.
#[derive(Debug, Clone)]
pub struct ContainerSwitch {
    host_name: String,
    record: Arc<ContainerRecord>,
    cache: Arc<HostCache>,
}

impl ContainerSwitch {
    #[must_use]
    pub fn new(host_name: &str, record: Arc<ContainerRecord>, cache: Arc<HostCache>) -> Self {
        Self {
            host_name: host_name.to_string(),
            record,
            cache,
        }
    }

    #[must_use]
    pub fn container(&self) -> &str {
        self.record.name()
    }

    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("docker_{}_{}", self.host_name, self.record.name())
    }

    #[must_use]
    pub fn name(&self) -> String {
        format!("Docker {} {}", self.host_name, self.record.name())
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.record.is_running()
    }

    pub async fn turn_on(&self) {
        self.record.start().await;
    }

    pub async fn turn_off(&self) {
        self.record.stop(DEFAULT_STOP_TIMEOUT).await;
    }

    #[must_use]
    pub fn state(&self) -> EntityState {
        EntityState {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: EntityKind::Switch,
            state: Some(if self.is_on() { "on" } else { "off" }.to_string()),
            icon: SWITCH_ICON,
            unit: None,
            device_class: None,
            attributes: Some(self.record.snapshot()),
            device: DeviceInfo::container(
                &self.host_name,
                self.record.name(),
                format!("{}_{}", self.host_name, self.record.name()),
                &self.cache,
            ),
        }
    }
}

/// All entities of one configured host.
#[derive(Debug, Clone)]
pub struct EntitySet {
    host_name: String,
    cache: Arc<HostCache>,
    conditions: Vec<ContainerCondition>,
    host_sensors: Vec<HostSensor>,
    container_sensors: Vec<ContainerSensor>,
    switches: Vec<ContainerSwitch>,
}

impl EntitySet {
    /// Build host sensors plus, for every container currently in the cache, its switch and (if
    /// `create_sensors` is set) one sensor per monitored condition.
    #[must_use]
    pub fn build(host_name: &str, entry: &HostEntry, cache: &Arc<HostCache>) -> Self {
        let host_sensors = HostCondition::ALL
            .iter()
            .map(|&condition| HostSensor::new(host_name, condition, Arc::clone(cache)))
            .collect();
        let conditions = if entry.create_sensors {
            entry.monitored_conditions.clone()
        } else {
            Vec::new()
        };
        let mut set = Self {
            host_name: host_name.to_string(),
            cache: Arc::clone(cache),
            conditions,
            host_sensors,
            container_sensors: Vec::new(),
            switches: Vec::new(),
        };
        let added = set.add_new_containers();
        if added == 0 {
            info!("No containers setup for {host_name}");
        }
        set
    }

    /// Create entities for containers that appeared in the cache after the set was built.
    ///
    /// Returns the number of containers added.
    pub fn add_new_containers(&mut self) -> usize {
        let mut added = 0;
        for record in self.cache.containers() {
            if self.switch(record.name()).is_some() {
                continue;
            }
            debug!("Creating entities for container {}", record.name());
            for &condition in &self.conditions {
                self.container_sensors.push(ContainerSensor::new(
                    &self.host_name,
                    condition,
                    Arc::clone(&record),
                    Arc::clone(&self.cache),
                ));
            }
            self.switches.push(ContainerSwitch::new(
                &self.host_name,
                record,
                Arc::clone(&self.cache),
            ));
            added += 1;
        }
        added
    }

    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<HostCache> {
        &self.cache
    }

    #[must_use]
    pub fn switch(&self, container: &str) -> Option<&ContainerSwitch> {
        self.switches.iter().find(|s| s.container() == container)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.host_sensors.len() + self.container_sensors.len() + self.switches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render every entity: host sensors, then container sensors, then switches.
    #[must_use]
    pub fn states(&self) -> Vec<EntityState> {
        self.host_sensors
            .iter()
            .map(HostSensor::state)
            .chain(self.container_sensors.iter().map(ContainerSensor::state))
            .chain(self.switches.iter().map(ContainerSwitch::state))
            .collect()
    }
}
