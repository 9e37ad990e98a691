//! Single-topic publish/subscribe for "host data updated" events.

use alloc::{sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

/// Events published by a [`HostCache`](super::HostCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    /// A poll tick finished. Subscribers pull fresh values from the cache.
    Updated,
}

/// Handle returned by [`Notifier::subscribe`], used to unsubscribe again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler = Arc<dyn Fn(HostEvent) + Send + Sync>;

/// Delivers events synchronously to all current subscribers, in registration order.
#[derive(Default)]
pub struct Notifier {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionToken, Handler)>>,
}

impl core::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionToken, Handler)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler`; it gets called on every publish until unsubscribed.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(HostEvent) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers().push((token, Arc::new(handler)));
        token
    }

    /// Subscribe through a channel instead of a callback.
    ///
    /// Once the receiver is dropped, events are silently discarded until the token is
    /// unsubscribed.
    pub fn subscribe_channel(&self) -> (SubscriptionToken, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.subscribe(move |event| {
            if tx.send(event).is_err() {
                trace!("Dropped event for closed subscriber channel");
            }
        });
        (token, rx)
    }

    /// Remove a subscription. Returns whether it was still registered; calling this twice is fine.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|&(t, _)| t != token);
        subscribers.len() != before
    }

    /// Deliver `event` to every subscriber and return how many were called.
    pub fn publish(&self, event: HostEvent) -> usize {
        // Handlers run outside the lock so they may (un)subscribe themselves.
        let handlers: Vec<Handler> = self
            .subscribers()
            .iter()
            .map(|&(_, ref handler)| Arc::clone(handler))
            .collect();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn delivers_in_registration_order() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            notifier.subscribe(move |_| seen.lock().unwrap().push(i));
        }
        assert_eq!(notifier.publish(HostEvent::Updated), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let notifier = Notifier::new();
        let token = notifier.subscribe(|_| {});
        assert!(notifier.unsubscribe(token));
        assert!(!notifier.unsubscribe(token));
        assert_eq!(notifier.publish(HostEvent::Updated), 0);
    }

    #[test]
    fn unsubscribing_one_keeps_the_others() {
        let notifier = Notifier::new();
        let count = Arc::new(AtomicU64::new(0));
        let first = notifier.subscribe(|_| {});
        let count2 = Arc::clone(&count);
        notifier.subscribe(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        notifier.unsubscribe(first);
        notifier.publish(HostEvent::Updated);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn channel_subscribers_receive_events() {
        let notifier = Notifier::new();
        let (token, mut rx) = notifier.subscribe_channel();
        notifier.publish(HostEvent::Updated);
        assert_eq!(rx.recv().await, Some(HostEvent::Updated));

        drop(rx);
        // A closed receiver must not break delivery to others.
        assert_eq!(notifier.publish(HostEvent::Updated), 1);
        assert!(notifier.unsubscribe(token));
    }

    #[test]
    fn event_serializes_as_tagged_enum() {
        let json = serde_json::to_string(&HostEvent::Updated).unwrap();
        assert_eq!(json, r#"{"type":"Updated"}"#);
    }
}
