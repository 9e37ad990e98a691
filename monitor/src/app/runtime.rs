//! Background tasks of the monitor: the poll timer per host and the entity state renderer.

use alloc::{string::String, sync::Arc, vec::Vec};
use core::time::Duration;
use std::collections::HashMap;

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{Instrument as _, debug, error, info};

use super::cache::{HostCache, InvalidInterval};
use crate::entities::{EntitySet, EntityState};

/// Drives [`HostCache::refresh`] on the cache's poll interval.
///
/// Exactly one timer is pending at any time. Changing the interval drops it and schedules a new
/// one; a tick that is already running finishes first. Dropping the poller stops it as well, but
/// only [`Poller::shutdown`] waits for the task to end.
#[derive(Debug)]
pub struct Poller {
    cache: Arc<HostCache>,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Poller {
    /// Start polling `cache`. The first tick fires one poll interval from now.
    #[must_use]
    pub fn spawn(cache: Arc<HostCache>) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let interval_rx = cache.subscribe_poll_interval();
        let task = tokio::spawn(
            poll_loop(Arc::clone(&cache), interval_rx, shutdown_rx).in_current_span(),
        );
        Self {
            cache,
            shutdown_tx,
            task,
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<HostCache> {
        &self.cache
    }

    /// Cancel the pending timer and reschedule with `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInterval`] if `interval` is zero.
    pub fn set_poll_interval(&self, interval: Duration) -> Result<(), InvalidInterval> {
        self.cache.set_poll_interval(interval)
    }

    /// Stop polling and wait until the poll task has ended.
    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("Poll task already gone");
        }
        if let Err(e) = self.task.await {
            error!("Poll task for {} failed: {e}", self.cache.endpoint());
        }
    }
}

async fn poll_loop(
    cache: Arc<HostCache>,
    mut interval_rx: watch::Receiver<Duration>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        let interval = *interval_rx.borrow_and_update();
        tokio::select! {
            () = sleep(interval) => run_tick(&cache).await,
            res = interval_rx.changed() => {
                if res.is_err() {
                    break;
                }
                debug!("Rescheduling poll timer");
            }
            _ = &mut shutdown_rx => break,
        }
    }
    info!("Stopped polling {}", cache.endpoint());
}

/// Run one refresh as its own task, so a panic inside it doesn't take the timer down.
async fn run_tick(cache: &Arc<HostCache>) {
    let cache = Arc::clone(cache);
    let tick = tokio::spawn(async move { cache.refresh().await }.in_current_span());
    match tick.await {
        Ok(summary) => debug!(?summary, "Poll tick finished"),
        Err(e) => error!("Unable to fetch data from Docker: {e}"),
    }
}

/// Re-renders an [`EntitySet`] on every update of its cache and logs the entities whose state
/// changed.
///
/// Containers that show up after startup get entities as well.
#[derive(Debug)]
pub struct Renderer {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<EntitySet>,
}

impl Renderer {
    #[must_use]
    pub fn spawn(entities: EntitySet) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(render_loop(entities, shutdown_rx).in_current_span());
        Self { shutdown_tx, task }
    }

    /// Stop rendering and hand the entities back. Updates already queued are rendered first.
    ///
    /// Returns `None` if the render task panicked.
    pub async fn shutdown(self) -> Option<EntitySet> {
        if self.shutdown_tx.send(()).is_err() {
            debug!("Render task already gone");
        }
        match self.task.await {
            Ok(entities) => Some(entities),
            Err(e) => {
                error!("Render task failed: {e}");
                None
            }
        }
    }
}

async fn render_loop(mut entities: EntitySet, mut shutdown_rx: oneshot::Receiver<()>) -> EntitySet {
    let (token, mut events) = entities.cache().notifier().subscribe_channel();
    let mut last = index(entities.states());
    loop {
        tokio::select! {
            biased;
            event = events.recv() => {
                if event.is_none() {
                    break;
                }
                let added = entities.add_new_containers();
                if added > 0 {
                    info!("Found {added} new container(s) on {}", entities.host_name());
                }
                let current = index(entities.states());
                for state in changed(&last, &current) {
                    info!(
                        entity = %state.unique_id,
                        state = state.state.as_deref().unwrap_or("unknown"),
                        "{} changed",
                        state.name
                    );
                }
                last = current;
            }
            _ = &mut shutdown_rx => break,
        }
    }
    entities.cache().notifier().unsubscribe(token);
    entities
}

fn index(states: Vec<EntityState>) -> HashMap<String, EntityState> {
    states
        .into_iter()
        .map(|state| (state.unique_id.clone(), state))
        .collect()
}

fn changed<'map>(
    previous: &HashMap<String, EntityState>,
    current: &'map HashMap<String, EntityState>,
) -> Vec<&'map EntityState> {
    let mut out: Vec<_> = current
        .values()
        .filter(|state| previous.get(&state.unique_id) != Some(*state))
        .collect();
    out.sort_unstable_by(|a, b| a.unique_id.cmp(&b.unique_id));
    out
}
