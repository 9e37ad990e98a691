//! End-to-end scenarios through the public library API, on top of the in-memory engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dockerhost_monitor::{
    app::{HostEvent, Poller},
    config::HostEntry,
    engine::{MemoryContainer, MemoryEngine},
    entities::EntitySet,
};
use tokio::time::sleep;

use crate::common::memory_host;

const STARTED: &str = "2024-11-02T08:15:42Z";

#[tokio::test(start_paused = true)]
async fn switch_toggle_is_optimistic_and_reconciled_by_polling() {
    let engine = Arc::new(
        MemoryEngine::default()
            .with_container("web", MemoryContainer::running("nginx:1.27", STARTED))
            .with_command_latency(Duration::from_secs(3)),
    );
    let cache = memory_host(&engine, Duration::from_secs(10)).await;
    cache.refresh().await;
    let entities = EntitySet::build("lab", &HostEntry::default(), &cache);
    let poller = Poller::spawn(Arc::clone(&cache));

    let switch = entities.switch("web").expect("switch for web");
    assert!(switch.is_on());

    // The engine refuses the stop; the switch shows off until the next poll says otherwise.
    engine.set_reachable(false);
    switch.turn_off().await;
    assert!(!switch.is_on());
    engine.set_reachable(true);

    sleep(Duration::from_secs(10)).await;
    assert!(switch.is_on(), "poll tick reconciles the failed stop");

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn containers_appear_and_are_never_evicted() {
    let engine = Arc::new(
        MemoryEngine::default().with_container("web", MemoryContainer::running("nginx:1", STARTED)),
    );
    let cache = memory_host(&engine, Duration::from_secs(5)).await;
    let updates = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&updates);
    let token = cache.notifier().subscribe(move |event| {
        assert_eq!(event, HostEvent::Updated);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let poller = Poller::spawn(Arc::clone(&cache));

    sleep(Duration::from_secs(6)).await;
    assert_eq!(cache.container_names(), ["web"]);

    engine.insert_container("db", MemoryContainer::running("postgres:16", STARTED));
    sleep(Duration::from_secs(5)).await;
    assert_eq!(cache.container_names(), ["db", "web"]);

    let web_before = cache.lookup("web").unwrap().snapshot();
    engine.remove_container("web");
    sleep(Duration::from_secs(5)).await;
    assert_eq!(cache.container_names(), ["db", "web"]);
    assert_eq!(cache.lookup("web").unwrap().snapshot(), web_before);

    assert_eq!(updates.load(Ordering::SeqCst), 3);
    assert!(cache.notifier().unsubscribe(token));
    assert!(!cache.notifier().unsubscribe(token));

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn runtime_interval_change_applies_to_next_tick() {
    let engine = Arc::new(MemoryEngine::demo());
    let cache = memory_host(&engine, Duration::from_secs(30)).await;
    let poller = Poller::spawn(Arc::clone(&cache));

    poller.set_poll_interval(Duration::from_secs(2)).unwrap();
    sleep(Duration::from_secs(7)).await;
    assert_eq!(engine.list_calls(), 3);
    assert!(poller.set_poll_interval(Duration::ZERO).is_err());
    assert_eq!(cache.poll_interval(), Duration::from_secs(2));

    poller.shutdown().await;
}
