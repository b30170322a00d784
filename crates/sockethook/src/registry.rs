//! Subscription registry: endpoint name → live subscriber connections.
//!
//! Uses DashMap so that mutations on one endpoint only lock that endpoint's
//! shard. Every operation is a short critical section over a `Vec`; no lock
//! is ever held while a message is sent.

use crate::error::Result;
use axum::extract::ws::Utf8Bytes;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique subscriber identifier.
///
/// Identity is per connection, not per peer: one peer may hold several
/// independent subscriptions to the same endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live connection that can receive broadcast frames.
pub trait Subscriber: Send + Sync {
    /// Identifier used for pruning.
    fn id(&self) -> SubscriberId;

    /// Hand one JSON text frame to the connection.
    ///
    /// Must not block on network I/O. An error means the connection is
    /// unusable and will be closed and pruned.
    fn send(&self, frame: &Utf8Bytes) -> Result<()>;

    /// Close the connection. Calling this more than once is harmless.
    fn close(&self);
}

/// Concurrency-safe map of endpoint name to its ordered subscriber list.
///
/// Unknown endpoints behave exactly like endpoints with no subscribers.
/// Entries are created on first subscribe and dropped when their last
/// subscriber is pruned.
pub struct SubscriptionRegistry {
    endpoints: DashMap<String, Vec<Arc<dyn Subscriber>>>,
}

impl SubscriptionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            endpoints: DashMap::new(),
        }
    }

    /// Append a subscriber to an endpoint, creating the endpoint if needed.
    ///
    /// Returns the number of subscribers on the endpoint after the insert.
    pub fn subscribe(&self, endpoint: &str, subscriber: Arc<dyn Subscriber>) -> usize {
        let mut subscribers = self.endpoints.entry(endpoint.to_string()).or_default();
        subscribers.push(subscriber);
        subscribers.len()
    }

    /// Copy the current subscriber list for an endpoint.
    ///
    /// The returned `Vec` is independent of the registry and may be iterated
    /// while other tasks subscribe or prune.
    pub fn snapshot(&self, endpoint: &str) -> Vec<Arc<dyn Subscriber>> {
        self.endpoints
            .get(endpoint)
            .map(|subscribers| subscribers.value().clone())
            .unwrap_or_default()
    }

    /// Remove one occurrence of a subscriber from an endpoint.
    ///
    /// Returns `true` if an entry was removed. Pruning a subscriber that is
    /// not present, or an endpoint that was never seen, is a no-op.
    pub fn prune(&self, endpoint: &str, id: SubscriberId) -> bool {
        let removed = match self.endpoints.get_mut(endpoint) {
            Some(mut subscribers) => match subscribers.iter().position(|s| s.id() == id) {
                Some(index) => {
                    subscribers.remove(index);
                    true
                }
                None => false,
            },
            None => false,
        };

        if removed {
            // Re-checked under the shard write lock, so a concurrent subscribe wins.
            self.endpoints
                .remove_if(endpoint, |_, subscribers| subscribers.is_empty());
        }
        removed
    }

    /// Number of subscribers on an endpoint.
    pub fn subscriber_count(&self, endpoint: &str) -> usize {
        self.endpoints.get(endpoint).map_or(0, |s| s.value().len())
    }

    /// Number of endpoints with at least one subscriber.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Number of subscribers across all endpoints.
    pub fn total_subscribers(&self) -> usize {
        self.endpoints.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeSubscriber;
    use super::*;

    fn ids(subscribers: &[Arc<dyn Subscriber>]) -> Vec<SubscriberId> {
        subscribers.iter().map(|s| s.id()).collect()
    }

    #[test]
    fn test_unknown_endpoint_is_empty() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.snapshot("/never-seen").is_empty());
        assert_eq!(registry.subscriber_count("/never-seen"), 0);
        assert_eq!(registry.endpoint_count(), 0);
    }

    #[test]
    fn test_subscribe_preserves_order() {
        let registry = SubscriptionRegistry::new();
        let a = FakeSubscriber::new();
        let b = FakeSubscriber::new();
        assert_eq!(registry.subscribe("/test", a.clone()), 1);
        assert_eq!(registry.subscribe("/test", b.clone()), 2);

        assert_eq!(ids(&registry.snapshot("/test")), vec![a.id, b.id]);
    }

    #[test]
    fn test_endpoints_are_isolated() {
        let registry = SubscriptionRegistry::new();
        let a = FakeSubscriber::new();
        let b = FakeSubscriber::new();
        registry.subscribe("/a", a.clone());
        registry.subscribe("/b", b.clone());

        assert_eq!(ids(&registry.snapshot("/a")), vec![a.id]);
        assert_eq!(ids(&registry.snapshot("/b")), vec![b.id]);
        assert_eq!(registry.endpoint_count(), 2);
        assert_eq!(registry.total_subscribers(), 2);
    }

    #[test]
    fn test_same_subscriber_twice_is_not_deduplicated() {
        let registry = SubscriptionRegistry::new();
        let a = FakeSubscriber::new();
        registry.subscribe("/test", a.clone());
        registry.subscribe("/test", a.clone());
        assert_eq!(registry.subscriber_count("/test"), 2);

        // Prune removes a single occurrence.
        assert!(registry.prune("/test", a.id));
        assert_eq!(registry.subscriber_count("/test"), 1);
    }

    #[test]
    fn test_prune_removes_only_target() {
        let registry = SubscriptionRegistry::new();
        let a = FakeSubscriber::new();
        let b = FakeSubscriber::new();
        let c = FakeSubscriber::new();
        registry.subscribe("/test", a.clone());
        registry.subscribe("/test", b.clone());
        registry.subscribe("/test", c.clone());

        assert!(registry.prune("/test", b.id));
        assert_eq!(ids(&registry.snapshot("/test")), vec![a.id, c.id]);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let a = FakeSubscriber::new();
        let b = FakeSubscriber::new();
        registry.subscribe("/test", a.clone());
        registry.subscribe("/test", b.clone());

        assert!(registry.prune("/test", a.id));
        assert!(!registry.prune("/test", a.id));
        assert!(!registry.prune("/test", SubscriberId::new()));
        assert!(!registry.prune("/never-seen", a.id));
        assert_eq!(ids(&registry.snapshot("/test")), vec![b.id]);
    }

    #[test]
    fn test_last_prune_drops_endpoint() {
        let registry = SubscriptionRegistry::new();
        let a = FakeSubscriber::new();
        registry.subscribe("/test", a.clone());
        registry.prune("/test", a.id);

        assert_eq!(registry.endpoint_count(), 0);
        assert!(registry.snapshot("/test").is_empty());

        // Endpoint is recreated implicitly.
        registry.subscribe("/test", a.clone());
        assert_eq!(registry.subscriber_count("/test"), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = SubscriptionRegistry::new();
        let a = FakeSubscriber::new();
        registry.subscribe("/test", a.clone());

        let snapshot = registry.snapshot("/test");
        registry.subscribe("/test", FakeSubscriber::new());
        registry.prune("/test", a.id);

        assert_eq!(ids(&snapshot), vec![a.id]);
        assert_eq!(registry.subscriber_count("/test"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_and_prune() {
        let registry = Arc::new(SubscriptionRegistry::new());

        // Half of these stay, half are pruned right after subscribing.
        let mut handles = Vec::new();
        for i in 0..200 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let sub = FakeSubscriber::new();
                registry.subscribe("/race", sub.clone());
                if i % 2 == 1 {
                    assert!(registry.prune("/race", sub.id));
                    None
                } else {
                    Some(sub.id)
                }
            }));
        }

        let mut kept = Vec::new();
        for handle in handles {
            if let Some(id) = handle.await.unwrap() {
                kept.push(id);
            }
        }

        let snapshot = ids(&registry.snapshot("/race"));
        assert_eq!(snapshot.len(), 100);
        for id in &kept {
            assert_eq!(snapshot.iter().filter(|s| *s == id).count(), 1);
        }
    }
}
