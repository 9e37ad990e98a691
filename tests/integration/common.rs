//! Common utilities for integration tests.
//!
//! This module provides shared functions used across the integration test modules, such as
//! spawning the binary, writing temporary configs and building in-memory hosts.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use dockerhost_monitor::{
    app::HostCache,
    engine::{Engine, MemoryEngine},
};

/// Guard that kills and waits on a child process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

fn dockerhost_bin() -> &'static str {
    env!("CARGO_BIN_EXE_dockerhost")
}

/// Write `config_toml` to a temp file unique to `name` and return its path.
pub fn write_config(name: &str, config_toml: &str) -> PathBuf {
    let tmp = env::temp_dir().join(format!("dockerhost_integration_{name}.toml"));
    fs::write(&tmp, config_toml).expect("failed to write config");
    tmp
}

fn command(args: &[&str]) -> Command {
    let mut cmd = Command::new(dockerhost_bin());
    cmd.env("DOCKERHOST_INTEGRATION_TEST", "1").args(args);
    cmd
}

/// Run the binary to completion and capture its output.
pub fn run(args: &[&str]) -> Output {
    command(args).output().expect("failed to run dockerhost")
}

/// Spawn the binary in the background, discarding its output.
pub fn spawn(args: &[&str]) -> Child {
    command(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start dockerhost")
}

/// A set up cache on top of `engine`, without any initial refresh.
pub async fn memory_host(engine: &Arc<MemoryEngine>, scan_interval: Duration) -> Arc<HostCache> {
    let cache = HostCache::with_engine(
        "memory://integration",
        Arc::clone(engine) as Arc<dyn Engine>,
        scan_interval,
    )
    .await
    .expect("memory engine is reachable");
    Arc::new(cache)
}
