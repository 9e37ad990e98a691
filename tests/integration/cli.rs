//! Tests that run the built `dockerhost` binary.

use std::thread;
use std::time::Duration;

use crate::common::{KillOnDrop, run, spawn, write_config};

const UNREACHABLE: &str = r#"
[hosts.nas]
endpoint = "tcp://127.0.0.1:9"
scan_interval = 1
"#;

#[test]
fn demo_once_prints_entity_states() {
    let output = run(&["demo", "--once"]);
    assert!(output.status.success(), "demo --once failed: {output:?}");

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is valid JSON");
    let hosts = json.as_array().expect("a list of hosts");
    assert_eq!(hosts.len(), 1);
    let host = &hosts[0];
    assert_eq!(host["host"], "DemoHost");

    let entities = host["entities"].as_array().expect("a list of entities");
    // 4 host sensors, 3 containers with 3 sensors and a switch each
    assert_eq!(entities.len(), 4 + 3 * 4);

    let find = |id: &str| {
        entities
            .iter()
            .find(|e| e["unique_id"] == id)
            .unwrap_or_else(|| panic!("entity {id} missing"))
    };
    assert_eq!(find("docker_DemoHost_Version")["state"], "27.3.1");
    assert_eq!(find("docker_DemoHost_mosquitto")["state"], "on");
    assert_eq!(find("docker_DemoHost_backup")["state"], "off");
    assert_eq!(find("DemoHost_backup_Image")["state"], "restic/restic:0.17.1");
    assert_eq!(
        find("docker_DemoHost_homeassistant")["attributes"]["container_status"],
        "running"
    );
}

#[test]
fn status_fails_for_unreachable_host() {
    let config = write_config("status_unreachable", UNREACHABLE);
    let output = run(&["status", "--config", config.to_str().unwrap()]);
    assert!(!output.status.success(), "status must fail: {output:?}");
    assert!(output.stdout.is_empty(), "nothing is printed on failure");
}

#[test]
fn missing_config_is_an_error() {
    let output = run(&["status", "--config", "/definitely/not/here.toml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Config file not found"), "{stderr}");
}

#[test]
fn start_on_unknown_host_is_an_error() {
    let config = write_config("start_unknown_host", UNREACHABLE);
    let output = run(&[
        "start",
        "--config",
        config.to_str().unwrap(),
        "--host",
        "elsewhere",
        "web",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown host 'elsewhere'"), "{stderr}");
}

#[test]
fn monitor_keeps_retrying_unreachable_hosts() {
    let config = write_config("monitor_retry", UNREACHABLE);
    let child = spawn(&["monitor", "--config", config.to_str().unwrap()]);
    let mut guard = KillOnDrop(child);

    thread::sleep(Duration::from_secs(2));
    assert!(
        guard.0.try_wait().expect("failed to poll child").is_none(),
        "monitor must not exit while a host is not ready"
    );
}

#[test]
fn invalid_config_is_rejected_by_monitor() {
    let config = write_config(
        "monitor_invalid",
        r#"
        [hosts.nas]
        monitored_conditions = ["status", "temperature"]
        "#,
    );
    let output = run(&["monitor", "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse config"), "{stderr}");
}
