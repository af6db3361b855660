//! Progress broadcaster
//!
//! Keyed publish/subscribe registry: one topic per material key, each topic a
//! set of bounded per-subscriber queues.
//!
//! **Delivery rules:**
//! - `publish` never blocks; a subscriber whose queue is full misses the message
//! - Publishing to a key without subscribers is a no-op
//! - A topic's map entry is removed when its last subscription goes away
//!
//! All subscriber-set mutations happen under one mutex per broadcaster. The
//! lock is never held across an `.await`.

use newln_common::ProgressEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, warn};

type SubscriberId = u64;
type Topics = HashMap<String, Vec<(SubscriberId, mpsc::Sender<String>)>>;

struct Registry {
    topics: Mutex<Topics>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Topics> {
        // Recover from poisoning
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remove one subscriber; true if it was still registered
    fn remove(&self, key: &str, id: SubscriberId) -> bool {
        let mut topics = self.lock();
        let Some(subscribers) = topics.get_mut(key) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            topics.remove(key);
            debug!(key, "Topic torn down");
        }
        removed
    }
}

/// Keyed progress broadcaster
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    registry: Arc<Registry>,
}

impl ProgressBroadcaster {
    /// Create a broadcaster whose subscriptions buffer `queue_capacity` messages
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                topics: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    /// Attach a new subscriber to `key`
    pub fn subscribe(&self, key: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.registry.queue_capacity);
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);

        let mut topics = self.registry.lock();
        let subscribers = topics.entry(key.to_string()).or_default();
        subscribers.push((id, tx));
        debug!(key, subscriber_id = id, subscribers = subscribers.len(), "Subscribed");
        drop(topics);

        Subscription {
            id,
            key: key.to_string(),
            receiver: rx,
            registry: Arc::downgrade(&self.registry),
            registered: true,
        }
    }

    /// Detach `subscription` and close its queue
    ///
    /// Returns false if it had already been removed (e.g. pruned as closed).
    pub fn unsubscribe(&self, mut subscription: Subscription) -> bool {
        subscription.registered = false;
        let removed = self.registry.remove(&subscription.key, subscription.id);
        debug!(
            key = %subscription.key,
            subscriber_id = subscription.id,
            removed,
            "Unsubscribed"
        );
        removed
    }

    /// Best-effort, non-blocking send of `message` to every subscriber of `key`
    ///
    /// Returns the number of subscribers the message was queued for.
    pub fn publish(&self, key: &str, message: &str) -> usize {
        let mut topics = self.registry.lock();
        let Some(subscribers) = topics.get_mut(key) else {
            debug!(key, "Publish to topic without subscribers");
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|(id, tx)| match tx.try_send(message.to_string()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(key, subscriber_id = *id, "Subscriber queue full, message dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(key, subscriber_id = *id, "Pruning closed subscriber");
                false
            }
        });

        if subscribers.is_empty() {
            topics.remove(key);
        }
        delivered
    }

    /// Encode and publish a progress event
    pub fn publish_event(&self, key: &str, event: &ProgressEvent) -> usize {
        self.publish(key, &event.to_message())
    }

    /// Current subscriber count for `key`
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.registry.lock().get(key).map_or(0, |subs| subs.len())
    }

    /// Number of live topics
    pub fn topic_count(&self) -> usize {
        self.registry.lock().len()
    }
}

/// One subscriber's bounded queue on a topic
///
/// Dropping a subscription unsubscribes it.
pub struct Subscription {
    id: SubscriberId,
    key: String,
    receiver: mpsc::Receiver<String>,
    registry: Weak<Registry>,
    registered: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next message; `None` once the subscription has been removed and drained
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.registered {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.key, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newln_common::JobStatus;

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let broadcaster = ProgressBroadcaster::new(4);
        assert_eq!(broadcaster.publish("nobody", "hello"), 0);
        assert_eq!(broadcaster.topic_count(), 0);
    }

    #[test]
    fn test_all_subscribers_receive() {
        let broadcaster = ProgressBroadcaster::new(4);
        let mut a = broadcaster.subscribe("m1");
        let mut b = broadcaster.subscribe("m1");
        let mut other = broadcaster.subscribe("m2");

        assert_eq!(broadcaster.publish("m1", "tick"), 2);
        assert_eq!(a.try_recv().unwrap(), "tick");
        assert_eq!(b.try_recv().unwrap(), "tick");
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let broadcaster = ProgressBroadcaster::new(2);
        let mut slow = broadcaster.subscribe("m1");

        assert_eq!(broadcaster.publish("m1", "1"), 1);
        assert_eq!(broadcaster.publish("m1", "2"), 1);
        assert_eq!(broadcaster.publish("m1", "3"), 0);

        assert_eq!(slow.try_recv().unwrap(), "1");
        assert_eq!(slow.try_recv().unwrap(), "2");
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Empty)));
        // Still subscribed after the drop
        assert_eq!(broadcaster.subscriber_count("m1"), 1);
    }

    #[test]
    fn test_unsubscribe_removes_once_and_tears_down_topic() {
        let broadcaster = ProgressBroadcaster::new(4);
        let first = broadcaster.subscribe("m1");
        let mut second = broadcaster.subscribe("m1");
        assert_eq!(broadcaster.subscriber_count("m1"), 2);

        assert!(broadcaster.unsubscribe(first));
        assert_eq!(broadcaster.subscriber_count("m1"), 1);

        broadcaster.publish("m1", "completed");
        assert_eq!(second.try_recv().unwrap(), "completed");

        drop(second);
        assert_eq!(broadcaster.topic_count(), 0);
    }

    #[test]
    fn test_drop_after_unsubscribe_does_not_remove_twice() {
        let broadcaster = ProgressBroadcaster::new(4);
        let sub = broadcaster.subscribe("m1");
        let id = sub.id();
        assert!(broadcaster.unsubscribe(sub));
        assert!(!broadcaster.registry.remove("m1", id));
    }

    #[test]
    fn test_publish_event_encodes_wire_message() {
        let broadcaster = ProgressBroadcaster::new(4);
        let mut sub = broadcaster.subscribe("m1");
        broadcaster.publish_event("m1", &ProgressEvent::status(JobStatus::Completed));
        assert_eq!(sub.try_recv().unwrap(), r#"{"status":"completed"}"#);
    }

    #[tokio::test]
    async fn test_concurrent_unsubscribe_and_publish() {
        let broadcaster = ProgressBroadcaster::new(64);
        let subs: Vec<Subscription> = (0..32).map(|_| broadcaster.subscribe("hot")).collect();

        let publisher = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    broadcaster.publish("hot", &i.to_string());
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut handles = Vec::new();
        for sub in subs {
            let broadcaster = broadcaster.clone();
            handles.push(tokio::spawn(async move { broadcaster.unsubscribe(sub) }));
        }

        let mut removed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                removed += 1;
            }
        }
        publisher.await.unwrap();

        assert_eq!(removed, 32);
        assert_eq!(broadcaster.topic_count(), 0);
    }
}
