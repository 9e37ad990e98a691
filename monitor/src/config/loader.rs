//! Configuration loading utilities for the monitor.
//!
//! This module provides functions for reading and parsing
//! configuration files from disk.

use std::path::Path;

use eyre::WrapErr as _;
use tokio::fs;

use crate::config::MonitorConfig;

/// Reads the monitor config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid monitor config.
pub async fn load<P: AsRef<Path>>(path: P) -> eyre::Result<MonitorConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("Failed to read config file at: {}", path.display()))?;
    parse(&content).wrap_err_with(|| format!("Failed to parse config at: {}", path.display()))
}

/// Parses a monitor config from TOML text.
///
/// # Errors
///
/// Returns an error for invalid TOML, unknown monitored conditions or a zero scan interval.
pub fn parse(content: &str) -> eyre::Result<MonitorConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::{env, fs};

    use super::*;
    use crate::conditions::ContainerCondition;

    #[tokio::test]
    async fn load_monitor_config_file() {
        let toml_str = r#"
            [hosts.nas]
            endpoint = "tcp://192.168.1.20:2375"
            scan_interval = 10
            monitored_conditions = ["status"]
            create_sensors = false

            [hosts.local]
        "#;
        let tmp = env::temp_dir().join("dockerhost_test_config.toml");
        fs::write(&tmp, toml_str).unwrap();
        let cfg = load(&tmp).await.unwrap();
        let nas = cfg.hosts.get("nas").unwrap();
        assert_eq!(nas.endpoint, "tcp://192.168.1.20:2375");
        assert_eq!(nas.poll_interval(), Duration::from_secs(10));
        assert_eq!(nas.monitored_conditions, [ContainerCondition::Status]);
        assert!(!nas.create_sensors);
        assert!(cfg.hosts.contains_key("local"));
    }

    #[tokio::test]
    async fn load_monitor_config_missing_file() {
        let tmp = env::temp_dir().join("dockerhost_does_not_exist.toml");
        let res = load(&tmp).await;
        assert!(res.is_err(), "Expected error for missing file");
    }

    #[tokio::test]
    async fn load_monitor_config_invalid_toml() {
        let tmp = env::temp_dir().join("dockerhost_invalid.toml");
        fs::write(&tmp, "not valid toml").unwrap();
        let res = load(&tmp).await;
        assert!(res.is_err(), "Expected error for invalid TOML");
    }

    #[tokio::test]
    async fn load_example_config() {
        let temp_file = env::temp_dir().join("dockerhost_example_config.toml");
        fs::copy("../docs/examples/example_config.toml", &temp_file).unwrap();
        let cfg = load(&temp_file)
            .await
            .expect("Failed to load example_config.toml");
        let host = cfg.hosts.get("DockerHost").unwrap();
        assert_eq!(host.endpoint, "unix:///var/run/docker.sock");
        assert_eq!(host.poll_interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn load_reports_the_failing_file() {
        let tmp = env::temp_dir().join("dockerhost_bad_condition.toml");
        fs::write(&tmp, "[hosts.nas]\nmonitored_conditions = \"status,temperature\"\n").unwrap();
        let err = load(&tmp).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Failed to parse config at: {}", tmp.display())
        );
        assert!(parse("").unwrap().hosts.is_empty());
    }
}
