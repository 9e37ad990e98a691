//! Shim binary that calls into the `dockerhost_monitor` library's `inner_main`.
use clap::Parser as _;
use eyre::Result;

use dockerhost_monitor::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    dockerhost_monitor::inner_main(Cli::parse()).await
}
