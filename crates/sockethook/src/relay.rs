//! Broadcast engine and admission: webhook envelope → subscriber fan-out.
//!
//! A broadcast works on a snapshot of the endpoint's subscribers. Failed
//! sends are collected during the pass and pruned afterwards, so the
//! registry is never mutated while anything is iterating it and concurrent
//! broadcasts on the same endpoint cannot lose each other's updates.

use crate::envelope::Envelope;
use crate::registry::{Subscriber, SubscriptionRegistry};
use axum::extract::ws::Utf8Bytes;
use metrics::{counter, gauge};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Admits subscribers and fans envelopes out to them.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<SubscriptionRegistry>,
}

impl Relay {
    /// Create a relay over a shared registry.
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this relay reads and prunes.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Register a freshly established connection as a subscriber of `endpoint`.
    pub fn admit(&self, endpoint: &str, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.id();
        let clients = self.registry.subscribe(endpoint, subscriber);

        counter!("sockethook_subscribers_admitted_total").increment(1);
        gauge!("sockethook_active_subscribers").increment(1.0);

        info!(endpoint, subscriber = %id, clients, "client connected");
    }

    /// Remove a subscriber whose connection ended on its own.
    ///
    /// Safe to race with a broadcast that prunes the same subscriber.
    pub fn release(&self, endpoint: &str, subscriber: &dyn Subscriber) {
        if self.registry.prune(endpoint, subscriber.id()) {
            gauge!("sockethook_active_subscribers").decrement(1.0);
            info!(endpoint, subscriber = %subscriber.id(), "client disconnected");
        }
    }

    /// Deliver an envelope to every current subscriber of its endpoint.
    ///
    /// Subscribers whose send fails are closed and pruned; they never affect
    /// delivery to the others. Returns the number of successful deliveries.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        let endpoint = envelope.endpoint.as_str();
        counter!("sockethook_hooks_received_total").increment(1);

        // Serialize once for all subscribers.
        let frame = match envelope.to_json() {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                warn!(endpoint, error = %e, "failed to serialize envelope");
                return 0;
            }
        };

        let subscribers = self.registry.snapshot(endpoint);
        let mut failed = Vec::new();

        for subscriber in &subscribers {
            if let Err(e) = subscriber.send(&frame) {
                debug!(endpoint, subscriber = %subscriber.id(), error = %e, "delivery failed");
                failed.push(Arc::clone(subscriber));
            }
        }

        for subscriber in &failed {
            subscriber.close();
            if self.registry.prune(endpoint, subscriber.id()) {
                counter!("sockethook_subscribers_pruned_total").increment(1);
                gauge!("sockethook_active_subscribers").decrement(1.0);
            }
        }

        let delivered = subscribers.len() - failed.len();
        counter!("sockethook_messages_delivered_total").increment(delivered as u64);
        counter!("sockethook_delivery_failures_total").increment(failed.len() as u64);

        info!(endpoint, clients = delivered, failed = failed.len(), "hook broadcasted");
        delivered
    }
}
