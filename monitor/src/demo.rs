//! Demo mode: the full monitor against a simulated engine.
//!
//! The demo host flips its `backup` container on and off on every other poll tick, so the
//! renderer has something to report.

use alloc::sync::Arc;
use core::time::Duration;

use eyre::WrapErr as _;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument as _, info};

use crate::{
    app::{DEFAULT_STOP_TIMEOUT, HostCache, shutdown_signal, start_host},
    commands::{HostReport, print_json},
    config::HostEntry,
    engine::{Engine, MemoryEngine},
    entities::EntitySet,
};

const DEMO_HOST: &str = "DemoHost";
const DEMO_ENDPOINT: &str = "memory://demo";
const TOGGLED_CONTAINER: &str = "backup";

/// Set up the demo host and its cache.
async fn demo_cache(scan_interval: Duration) -> eyre::Result<Arc<HostCache>> {
    let engine: Arc<dyn Engine> = Arc::new(MemoryEngine::demo());
    let cache = HostCache::with_engine(DEMO_ENDPOINT, engine, scan_interval)
        .await
        .wrap_err("Failed to set up demo host")?;
    Ok(Arc::new(cache))
}

/// Run the demo. With `once`, print the entity states after one refresh and return.
///
/// # Errors
///
/// Returns an error if `scan_interval` is zero or the output can't be written.
pub async fn run_demo(once: bool, scan_interval: Duration) -> eyre::Result<()> {
    let cache = demo_cache(scan_interval).await?;
    let entry = HostEntry::default();

    if once {
        cache.refresh().await;
        let report = HostReport {
            host: DEMO_HOST.to_string(),
            endpoint: DEMO_ENDPOINT.to_string(),
            entities: EntitySet::build(DEMO_HOST, &entry, &cache).states(),
        };
        return print_json(&vec![report]);
    }

    info!("Starting demo with a simulated engine, polling every {scan_interval:?}");
    let host = start_host(DEMO_HOST, &entry, Arc::clone(&cache)).await;

    let toggler = tokio::spawn(
        async move {
            let mut ticker = interval(scan_interval * 2);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(record) = cache.lookup(TOGGLED_CONTAINER) else {
                    continue;
                };
                if record.is_running() {
                    record.stop(DEFAULT_STOP_TIMEOUT).await;
                } else {
                    record.start().await;
                }
            }
        }
        .in_current_span(),
    );

    shutdown_signal().await;
    info!("Received shutdown, shutting down");
    toggler.abort();
    host.shutdown().await;
    Ok(())
}
