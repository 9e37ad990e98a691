//! Configuration data types for the monitor.
//!
//! Each `[hosts.<name>]` table configures one engine endpoint; the table key doubles as the
//! display name used for entity names and ids.

use alloc::{string::String, vec::Vec};
use core::{num::NonZeroU64, time::Duration};
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, de::Error as _};

use crate::conditions::ContainerCondition;

/// Default engine endpoint, the local Docker socket.
pub const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// Default poll interval in seconds.
pub const DEFAULT_SCAN_INTERVAL: NonZeroU64 = NonZeroU64::new(30).expect("30 is non-zero");

/// One configured engine endpoint.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HostEntry {
    /// Engine address, `unix://`, `tcp://` or `http://`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Seconds between poll ticks. Can be changed at runtime.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: NonZeroU64,
    /// Container conditions to create sensors for. Accepts a list or a comma separated string.
    #[serde(
        default = "all_conditions",
        deserialize_with = "conditions_from_list_or_str"
    )]
    pub monitored_conditions: Vec<ContainerCondition>,
    /// Whether per-container sensors are created at all. Switches are always created.
    #[serde(default = "do_create_sensors")]
    pub create_sensors: bool,
}

impl Default for HostEntry {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            scan_interval: default_scan_interval(),
            monitored_conditions: all_conditions(),
            create_sensors: do_create_sensors(),
        }
    }
}

impl HostEntry {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval.get())
    }

    /// Whether `other` differs from `self` in anything besides the scan interval, i.e. whether
    /// the difference needs a restart to apply.
    #[must_use]
    pub fn differs_beyond_interval(&self, other: &Self) -> bool {
        Self {
            scan_interval: other.scan_interval,
            ..self.clone()
        } != *other
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_owned()
}

const fn default_scan_interval() -> NonZeroU64 {
    DEFAULT_SCAN_INTERVAL
}

fn all_conditions() -> Vec<ContainerCondition> {
    ContainerCondition::ALL.to_vec()
}

const fn do_create_sensors() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConditionList {
    List(Vec<String>),
    Joined(String),
}

fn conditions_from_list_or_str<'de, D>(deserializer: D) -> Result<Vec<ContainerCondition>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match ConditionList::deserialize(deserializer)? {
        ConditionList::List(list) => list,
        ConditionList::Joined(joined) => joined.split(',').map(str::to_owned).collect(),
    };
    let mut conditions = Vec::new();
    for item in raw.iter().filter(|s| !s.trim().is_empty()) {
        let condition: ContainerCondition = item.parse().map_err(D::Error::custom)?;
        if !conditions.contains(&condition) {
            conditions.push(condition);
        }
    }
    Ok(conditions)
}

/// Root config structure for the monitor.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Map of display names to engine endpoints.
    #[serde(default)]
    pub hosts: HashMap<String, HostEntry>,
}
