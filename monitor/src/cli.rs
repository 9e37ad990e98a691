//! Command-line interface definitions for the monitor.
//!
//! This module contains the CLI argument parsing structures and enums
//! used by the `dockerhost` binary.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::app::DEFAULT_STOP_TIMEOUT;

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
    Pretty,
}

/// Available subcommands for the monitor.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll every configured host until terminated, logging entity state changes.
    Monitor(ConfigArgs),

    /// Poll every configured host once and print all entity states as JSON.
    Status(ConfigArgs),

    /// Start a container on a configured host.
    Start(ContainerArgs),

    /// Stop a container on a configured host.
    Stop {
        #[command(flatten)]
        target: ContainerArgs,
        /// Seconds the container gets to exit before it is killed
        #[arg(long, default_value_t = DEFAULT_STOP_TIMEOUT.as_secs())]
        timeout: u64,
    },

    /// Run against a simulated engine with a few demo containers.
    Demo {
        /// Print the entity states once and exit instead of polling
        #[arg(long)]
        once: bool,
        /// Poll interval in seconds
        #[arg(long, default_value_t = 5)]
        scan_interval: u64,
    },
}

/// Location of the configuration file.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        env = "DOCKERHOST_CONFIG",
        default_value = "dockerhost.toml"
    )]
    pub config: String,
}

/// A container on one of the configured hosts.
#[derive(Debug, Args)]
pub struct ContainerArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Name of the host, as used as table key in the config file
    #[arg(long)]
    pub host: String,
    /// Name of the container
    pub container: String,
}
