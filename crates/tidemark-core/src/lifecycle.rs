use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::stats::SharedFeedStats;
use crate::store::SharedFeedStore;
use crate::subscription::FeedSubscription;
use crate::transport::{FeedTransport, TransportError};

/// One consumer's open subscriptions, at most one per feed.
///
/// Each consuming view owns its own set; resubscribing to a feed (e.g.
/// on a re-render without an explicit unmount) replaces the existing
/// handle instead of stacking a second stream, so events are never
/// delivered or counted twice.
pub struct SubscriptionSet {
    transport: Arc<dyn FeedTransport>,
    stats: SharedFeedStats,
    active: HashMap<String, FeedSubscription>,
}

impl SubscriptionSet {
    pub fn new(transport: Arc<dyn FeedTransport>, stats: SharedFeedStats) -> Self {
        Self {
            transport,
            stats,
            active: HashMap::new(),
        }
    }

    /// Open a subscription to `feed`, closing any existing handle for it
    /// first. Returns the shared mirror backing the new subscription.
    pub fn subscribe(&mut self, feed: &str, limit: usize) -> Result<SharedFeedStore, TransportError> {
        if let Some(previous) = self.active.remove(feed) {
            debug!("Replacing existing subscription to feed '{}'", feed);
            previous.close();
        }

        let store = SharedFeedStore::new(limit);
        let subscription = FeedSubscription::open(
            self.transport.as_ref(),
            feed,
            limit,
            store.clone(),
            self.stats.clone(),
        )?;
        self.active.insert(feed.to_string(), subscription);
        Ok(store)
    }

    pub fn is_subscribed(&self, feed: &str) -> bool {
        self.active.contains_key(feed)
    }

    pub fn store(&self, feed: &str) -> Option<SharedFeedStore> {
        self.active.get(feed).map(|s| s.store().clone())
    }

    pub fn unsubscribe(&mut self, feed: &str) {
        if let Some(subscription) = self.active.remove(feed) {
            subscription.close();
        }
    }

    /// Close every owned handle. Idempotent; invoked on consumer
    /// teardown, navigation away, and logout. Close errors are swallowed
    /// inside the handles, so cleanup never propagates.
    pub fn unsubscribe_all(&mut self) {
        for (feed, subscription) in self.active.drain() {
            debug!("Tearing down subscription to feed '{}'", feed);
            subscription.close();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn set(transport: &MemoryTransport) -> SubscriptionSet {
        SubscriptionSet::new(Arc::new(transport.clone()), SharedFeedStats::new())
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_instead_of_stacking() {
        let transport = MemoryTransport::new();
        let mut subs = set(&transport);

        let first = subs.subscribe("submissions", 5).unwrap();
        let second = subs.subscribe("submissions", 5).unwrap();

        // One window stream + one additions stream, not two of each
        assert_eq!(transport.active_listeners("submissions"), 2);

        transport
            .append("submissions", json!({ "id": "a", "createdAt": 100 }))
            .await
            .unwrap();

        // Only the live handle's mirror receives events
        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_subscriptions_are_per_feed() {
        let transport = MemoryTransport::new();
        let mut subs = set(&transport);

        subs.subscribe("submissions", 5).unwrap();
        subs.subscribe("contacts", 5).unwrap();

        assert!(subs.is_subscribed("submissions"));
        assert!(subs.is_subscribed("contacts"));
        assert_eq!(transport.active_listeners("submissions"), 2);
        assert_eq!(transport.active_listeners("contacts"), 2);

        subs.unsubscribe("contacts");
        assert!(!subs.is_subscribed("contacts"));
        assert_eq!(transport.active_listeners("contacts"), 0);
    }

    #[test]
    fn test_unsubscribe_all_is_idempotent() {
        let transport = MemoryTransport::new();
        let mut subs = set(&transport);

        subs.subscribe("submissions", 5).unwrap();
        subs.subscribe("contacts", 5).unwrap();

        subs.unsubscribe_all();
        subs.unsubscribe_all();

        assert_eq!(transport.active_listeners("submissions"), 0);
        assert_eq!(transport.active_listeners("contacts"), 0);
        assert!(subs.store("submissions").is_none());
    }

    #[test]
    fn test_drop_tears_down() {
        let transport = MemoryTransport::new();
        {
            let mut subs = set(&transport);
            subs.subscribe("submissions", 5).unwrap();
            assert_eq!(transport.active_listeners("submissions"), 2);
        }
        assert_eq!(transport.active_listeners("submissions"), 0);
    }
}
