//! Monitored condition kinds and their presentation descriptors.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Static presentation metadata for one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionDescriptor {
    /// Human readable name, used in entity names and unique ids.
    pub display_name: &'static str,
    pub unit: Option<&'static str>,
    pub icon: &'static str,
    pub device_class: Option<&'static str>,
    /// Key of the value in the snapshot / version info this condition reads from.
    pub attribute_key: &'static str,
}

/// Host level metadata published once per configured engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostCondition {
    Version,
    ApiVersion,
    Os,
    #[serde(alias = "architecture")]
    Arch,
}

impl HostCondition {
    pub const ALL: [Self; 4] = [Self::Version, Self::ApiVersion, Self::Os, Self::Arch];

    #[must_use]
    pub const fn descriptor(self) -> ConditionDescriptor {
        let (display_name, attribute_key) = match self {
            Self::Version => ("Version", "version"),
            Self::ApiVersion => ("ApiVersion", "api_version"),
            Self::Os => ("OS", "os"),
            Self::Arch => ("Architecture", "arch"),
        };
        ConditionDescriptor {
            display_name,
            unit: None,
            icon: "mdi:information-outline",
            device_class: None,
            attribute_key,
        }
    }
}

/// Per container values a sensor can be created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerCondition {
    Status,
    Uptime,
    Image,
}

impl ContainerCondition {
    /// All conditions, in snapshot order.
    pub const ALL: [Self; 3] = [Self::Status, Self::Uptime, Self::Image];

    #[must_use]
    pub const fn descriptor(self) -> ConditionDescriptor {
        match self {
            Self::Status => ConditionDescriptor {
                display_name: "Status",
                unit: None,
                icon: "mdi:checkbox-marked-circle-outline",
                device_class: None,
                attribute_key: "container_status",
            },
            Self::Uptime => ConditionDescriptor {
                display_name: "Up Time",
                unit: Some(""),
                icon: "mdi:clock",
                device_class: Some("timestamp"),
                attribute_key: "container_uptime",
            },
            Self::Image => ConditionDescriptor {
                display_name: "Image",
                unit: None,
                icon: "mdi:information-outline",
                device_class: None,
                attribute_key: "container_image",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("Unknown container condition '{0}' (expected status, uptime or image)")]
pub struct UnknownCondition(pub String);

impl FromStr for ContainerCondition {
    type Err = UnknownCondition;

    /// Accepts the short names as well as the attribute keys (`container_status`, ...).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let short = value.strip_prefix("container_").unwrap_or(value);
        match short {
            "status" => Ok(Self::Status),
            "uptime" => Ok(Self::Uptime),
            "image" => Ok(Self::Image),
            _ => Err(UnknownCondition(value.to_owned())),
        }
    }
}

impl fmt::Display for ContainerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Status => "status",
            Self::Uptime => "uptime",
            Self::Image => "image",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_conditions_parse_short_and_attribute_names() {
        assert_eq!("status".parse(), Ok(ContainerCondition::Status));
        assert_eq!(" uptime ".parse(), Ok(ContainerCondition::Uptime));
        assert_eq!("container_image".parse(), Ok(ContainerCondition::Image));
        assert_eq!(
            "cpu".parse::<ContainerCondition>(),
            Err(UnknownCondition("cpu".to_string()))
        );
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        for condition in ContainerCondition::ALL {
            assert_eq!(condition.to_string().parse(), Ok(condition));
        }
    }

    #[test]
    fn uptime_is_a_timestamp() {
        let desc = ContainerCondition::Uptime.descriptor();
        assert_eq!(desc.device_class, Some("timestamp"));
        assert_eq!(desc.icon, "mdi:clock");
        assert_eq!(desc.display_name, "Up Time");
    }

    #[test]
    fn host_condition_attribute_keys_match_version_info_fields() {
        let keys: Vec<_> = HostCondition::ALL
            .iter()
            .map(|c| c.descriptor().attribute_key)
            .collect();
        assert_eq!(keys, ["version", "api_version", "os", "arch"]);
    }

    #[test]
    fn host_condition_deserializes_architecture_alias() {
        #[derive(Deserialize)]
        struct Wrapper {
            c: HostCondition,
        }
        let w: Wrapper = toml::from_str(r#"c = "architecture""#).unwrap();
        assert_eq!(w.c, HostCondition::Arch);
    }
}
