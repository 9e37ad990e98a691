//! Library entry for the `dockerhost_monitor` crate.
//!
//! Exposes `inner_main` so a workspace-level shim binary can call into the monitor logic, and
//! the cache, engine and entity types for use in tests and embedding.

extern crate alloc;
extern crate core;

pub mod app;
pub mod cli;
pub mod commands;
pub mod conditions;
pub mod config;
pub mod demo;
pub mod engine;
pub mod entities;

use core::time::Duration;
use std::{env, fs, io, path::PathBuf, process, sync::Once};

use eyre::{Result, WrapErr as _};
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, ContainerArgs, LogFormat};
use commands::Action;

static INIT_TRACING: Once = Once::new();

/// Install the global tracing subscriber. Only the first call has an effect.
fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let default_level = if env::var("DOCKERHOST_INTEGRATION_TEST").is_ok() {
            "error"
        } else {
            "info"
        };

        // Logs go to stderr, stdout is reserved for command output.
        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339())
            .with_writer(io::stderr);

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

fn canonical_config(config: &str) -> Result<PathBuf> {
    fs::canonicalize(config).wrap_err(format!("Config file not found at: {config}"))
}

async fn control(target: ContainerArgs, action: Action) -> Result<()> {
    let config_path = canonical_config(&target.config.config)?;
    commands::control(&config_path, &target.host, &target.container, action).await
}

/// The monitor's main function; can be called from a shim binary.
///
/// # Errors
///
/// Returns an error if the config file is missing or invalid, or if a one-shot command fails.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    init_tracing(invocation.log_format);

    match invocation.command {
        Command::Monitor(args) => {
            let config_path = canonical_config(&args.config)?;
            let startup_span = tracing::info_span!(
                "monitor",
                ?config_path,
                pid = ?process::id(),
                version = env!("CARGO_PKG_VERSION")
            );
            async {
                info!("Starting monitor");
                app::start(&config_path).await
            }
            .instrument(startup_span)
            .await
        }
        Command::Status(args) => commands::status(&canonical_config(&args.config)?).await,
        Command::Start(target) => control(target, Action::Start).await,
        Command::Stop { target, timeout } => {
            control(target, Action::Stop(Duration::from_secs(timeout))).await
        }
        Command::Demo {
            once,
            scan_interval,
        } => demo::run_demo(once, Duration::from_secs(scan_interval)).await,
    }
}
